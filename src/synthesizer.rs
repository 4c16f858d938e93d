//! The lazy stream of candidate queries.
//!
//! A [`Synthesizer`] first yields an always-false placeholder, then every query already present
//! in the seeded bank, and then runs the bottom-up search: each step builds the new components
//! of one non-terminal kind at the current cost limit and merges them into the bank. When a
//! whole pass over the kinds adds nothing, the cost limit is widened. Every new query is
//! trimmed to each tuple of necessary output chains, concretized and rendered.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::alternatives::{same_name_chains, AlternativeRule};
use crate::ast;
use crate::bank::Bank;
use crate::concretize::{concretize, NameGenerator};
use crate::config::SynthConfig;
use crate::constraints::ConstraintSet;
use crate::cost::{Cost, CostEstimator};
use crate::dsl::{
    placeholder_query, terminal_library, Category, Component, ComponentCounter, IdGenerator, Kind,
};
use crate::generate::{generate_from_bank, GenContext, NON_TERMINAL_ORDER};
use crate::schema::Schema;
use crate::translate::{self, translate};
use crate::trim::trim;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cannot synthesize from this query: {0}")]
    Translation(#[from] translate::Error),
}

/// One rendered query and the cost level it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub sql: String,
    pub cost: Cost,
}

/// Search state owned by one synthesis run.
struct Search {
    bank: Bank,
    estimator: CostEstimator,
    necessary: Vec<Vec<Component>>,
    output_names: Vec<String>,
    cost_limit: Cost,
    next_kind: usize,
    grew: bool,
}

impl Search {
    fn setup(query: Component, output_names: Vec<String>, config: &SynthConfig) -> Search {
        let mut estimator = CostEstimator::new(&query);

        // Every column of every referenced table is free, used or not.
        let all = query.all_components();
        let columns: Vec<Component> = all
            .iter()
            .filter(|c| c.kind() == Kind::Table)
            .flat_map(|t| t.provided_chains())
            .collect();
        let mut free = ComponentCounter::new();
        for c in &columns {
            free.add(c.counter());
        }
        estimator.update_allow_cost_model(&free);

        let mut bank = Bank::new();
        bank.extend(
            all.into_iter()
                .chain(columns)
                .chain(terminal_library())
                .filter(|c| estimator.cost(c) <= 0),
        );

        let outputs = query.provided_chains();
        let mut necessary: Vec<Vec<Component>> = if outputs.len() > config.max_output_arity {
            vec![outputs.clone()]
        } else {
            outputs
                .iter()
                .map(|c| same_name_chains(c, &bank, &estimator))
                .multi_cartesian_product()
                .collect()
        };
        if necessary.is_empty() {
            necessary.push(outputs.clone());
        }
        necessary.sort_by_key(|t| *t != outputs);

        info!(
            bank = bank.len(),
            tuples = necessary.len(),
            "Seeded synthesis for {}",
            query
        );
        Search {
            bank,
            estimator,
            necessary,
            output_names,
            cost_limit: 0,
            next_kind: 0,
            grew: false,
        }
    }

    /// Renders the queries the seed bank already holds at no cost.
    fn seed_outputs(&self) -> Vec<String> {
        let queries = self.bank.get_from_bank(
            Category::Is(Kind::Query),
            0,
            self.estimator.model(),
            &self.estimator,
            &ConstraintSet::new(),
        );
        queries.iter().flat_map(|q| self.render(q)).collect()
    }

    fn apply_alternatives(&mut self) {
        for rule in AlternativeRule::ALL {
            let (components, allowance) = rule.generate_alternatives(&self.bank, &self.estimator);
            debug!(?rule, added = components.len(), "Applied alternative rule");
            self.bank.extend(components);
            self.estimator.update_allow_cost_model(&allowance);
        }
    }

    /// Every trimmed and concretized form of `query`, over all necessary tuples.
    fn render(&self, query: &Component) -> Vec<String> {
        let mut out = vec![];
        for tuple in &self.necessary {
            let trimmed = match trim(query, tuple, &self.output_names) {
                Ok(t) => t,
                Err(e) => {
                    trace!(%e, "Skipping {} for this output tuple", query);
                    continue;
                }
            };
            for t in trimmed {
                let mut names = NameGenerator::new();
                match concretize(&t, &mut names) {
                    Ok(c) => out.push(c.to_string()),
                    Err(e) => debug!(%e, "Cannot concretize {}", t),
                }
            }
        }
        out
    }

    /// Builds the next kind in the pass and returns the rendered new queries.
    fn expand(&mut self, config: &SynthConfig) -> Vec<String> {
        let kind = NON_TERMINAL_ORDER[self.next_kind];
        let ctx = GenContext {
            bank: &self.bank,
            estimator: &self.estimator,
            config,
        };
        let generated = generate_from_bank(kind, &ctx, self.cost_limit);
        let mut fresh = Bank::new();
        let mut sqls = vec![];
        for c in generated {
            if fresh.insert(c.clone()) && kind == Kind::Query {
                sqls.extend(self.render(&c));
            }
        }
        trace!(?kind, new = fresh.len(), cost_limit = self.cost_limit, "Expanded");
        self.grew |= !fresh.is_empty();
        self.bank.merge(fresh);

        self.next_kind += 1;
        if self.next_kind == NON_TERMINAL_ORDER.len() {
            self.next_kind = 0;
            if !self.grew {
                self.cost_limit += 1;
                info!(
                    cost_limit = self.cost_limit,
                    bank = self.bank.len(),
                    "Saturated, widening cost limit"
                );
            }
            self.grew = false;
        }
        sqls
    }
}

/// An unbounded iterator of candidate queries for one input query. It ends only when
/// `max_cost` is set and exceeded, or after reporting a translation error.
pub struct Synthesizer {
    config: SynthConfig,
    pending: VecDeque<Result<Candidate, Error>>,
    search: Option<Search>,
    seen: HashSet<String>,
    started: Instant,
    warned: bool,
}

impl Synthesizer {
    pub fn new(stmt: &ast::SelectStatement, schema: &Schema, config: SynthConfig) -> Synthesizer {
        let mut s = Synthesizer {
            config,
            pending: VecDeque::new(),
            search: None,
            seen: HashSet::new(),
            started: Instant::now(),
            warned: false,
        };
        s.push(placeholder_query(stmt.items.len()), 0);
        match translate(stmt, schema, &mut IdGenerator::new()) {
            Ok((query, output_names)) => {
                let mut search = Search::setup(query, output_names, &s.config);
                for sql in search.seed_outputs() {
                    s.push(sql, 0);
                }
                search.apply_alternatives();
                s.search = Some(search);
            }
            Err(e) => {
                warn!(%e, "Translation failed for {}", stmt);
                s.pending.push_back(Err(e.into()));
            }
        }
        s
    }

    fn push(&mut self, sql: String, cost: Cost) {
        if self.config.dedup_rendered && !self.seen.insert(sql.clone()) {
            return;
        }
        self.pending.push_back(Ok(Candidate { sql, cost }));
    }

    /// Runs one generation step. Returns false once the search is over.
    fn step(&mut self) -> bool {
        let Some(search) = self.search.as_mut() else {
            return false;
        };
        if let Some(budget) = self.config.generation_budget {
            if !self.warned && self.started.elapsed() > budget {
                warn!(?budget, "Synthesis is running over its generation budget");
                self.warned = true;
            }
        }
        let cost = search.cost_limit;
        let sqls = search.expand(&self.config);
        let exhausted = matches!(self.config.max_cost, Some(max) if search.cost_limit > max);
        for sql in sqls {
            self.push(sql, cost);
        }
        if exhausted {
            info!("Reached the maximum cost");
            self.search = None;
        }
        true
    }
}

impl Iterator for Synthesizer {
    type Item = Result<Candidate, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if !self.step() {
                return None;
            }
        }
    }
}

#[cfg(test)]
use crate::pt_to_ast::pt_select_statement_to_ast;

#[cfg(test)]
fn synthesizer(sql: &str, config: SynthConfig) -> Synthesizer {
    let schema = Schema::from_sql(
        "CREATE TABLE customers (id int, name varchar); CREATE TABLE orders (id int, cust int)",
    )
    .unwrap();
    Synthesizer::new(&pt_select_statement_to_ast(sql).unwrap(), &schema, config)
}

#[test]
fn test_necessary_tuples_start_with_the_literal() {
    let s = synthesizer(
        "SELECT orders.id FROM customers JOIN orders ON customers.id = orders.cust",
        SynthConfig::default(),
    );
    let search = s.search.as_ref().unwrap();
    assert_eq!(search.necessary.len(), 2);
    assert_eq!(search.necessary[0][0].to_string(), "\"orders\".\"id\"");
    assert_eq!(search.necessary[1][0].to_string(), "\"customers\".\"id\"");
}

#[test]
fn test_arity_bound_keeps_only_the_literal() {
    let config = SynthConfig {
        max_output_arity: 0,
        ..SynthConfig::default()
    };
    let s = synthesizer(
        "SELECT orders.id FROM customers JOIN orders ON customers.id = orders.cust",
        config,
    );
    assert_eq!(s.search.as_ref().unwrap().necessary.len(), 1);
}

#[test]
fn test_stream_ends_after_max_cost() {
    let config = SynthConfig {
        max_cost: Some(0),
        ..SynthConfig::default()
    };
    let s = synthesizer("SELECT customers.name FROM customers", config);
    let all: Vec<Candidate> = s.map(|c| c.unwrap()).collect();
    assert!(all.len() >= 2);
    assert!(all.iter().all(|c| c.cost == 0));
    let distinct: HashSet<&String> = all.iter().map(|c| &c.sql).collect();
    assert_eq!(distinct.len(), all.len());
}

#[test]
fn test_translation_error_is_reported_after_placeholder() {
    let s = synthesizer("SELECT price FROM orders", SynthConfig::default());
    let items: Vec<Result<Candidate, Error>> = s.collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert_eq!(
        items[1],
        Err(Error::Translation(translate::Error::AliasResolutionMissing(
            String::from("price")
        )))
    );
}
