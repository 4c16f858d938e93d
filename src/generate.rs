//! Bottom-up construction of new composites from components already in the bank.
//!
//! Every generator picks its children slot by slot. After a child is chosen, its cost is taken
//! off the remaining budget and its counter off the cost model, so later siblings are costed
//! against what is left. A candidate is emitted only if its own cost is within the budget and
//! the bank does not hold it yet.

use std::collections::HashSet;

use itertools::Itertools;

use crate::bank::Bank;
use crate::config::SynthConfig;
use crate::constraints::{Constraint, ConstraintSet};
use crate::cost::{Cost, CostEstimator, CostModel};
use crate::data_type::DataType;
use crate::dsl::{AggFunc, Category, CompareOp, Component, Kind, Node, Query};

/// Non-terminal kinds in the order a synthesis pass builds them.
pub const NON_TERMINAL_ORDER: [Kind; 16] = [
    Kind::AggChain,
    Kind::WindowFuncChain,
    Kind::Aggregation,
    Kind::PartitionList,
    Kind::WindowFuncClause,
    Kind::GroupByList,
    Kind::OrderByItem,
    Kind::OrderByList,
    Kind::PredicateLogic,
    Kind::PredicateOp,
    Kind::WindowCallAgg,
    Kind::WindowCallFunc,
    Kind::TableSource,
    Kind::QuerySource,
    Kind::Join,
    Kind::Query,
];

pub struct GenContext<'a> {
    pub bank: &'a Bank,
    pub estimator: &'a CostEstimator,
    pub config: &'a SynthConfig,
}

/// What is left to spend on the remaining children of a composite.
#[derive(Clone)]
struct Remainder {
    budget: Cost,
    model: CostModel,
}

impl<'a> GenContext<'a> {
    fn start(&self, budget: Cost) -> Remainder {
        Remainder {
            budget,
            model: self.estimator.model().clone(),
        }
    }

    fn after(&self, r: &Remainder, used: &Component) -> Remainder {
        Remainder {
            budget: r.budget - self.estimator.cost(used),
            model: r.model.without(used),
        }
    }

    fn pick(&self, category: Category, r: &Remainder, constraints: Vec<Constraint>) -> Vec<Component> {
        self.bank.get_from_bank(
            category,
            r.budget,
            &r.model,
            self.estimator,
            &ConstraintSet::from(constraints),
        )
    }

    fn accept(&self, candidate: &Component, budget: Cost) -> bool {
        self.estimator.cost(candidate) <= budget && !self.bank.contains(candidate)
    }

    fn max_source_depth(&self) -> usize {
        self.config.depth_limit.saturating_sub(1)
    }

    /// Non-empty combinations of bank components, up to the configured list length.
    fn lists(&self, items: Vec<Component>) -> Vec<Vec<Component>> {
        (1..=self.config.list_length_limit)
            .flat_map(|k| items.iter().cloned().combinations(k))
            .collect()
    }
}

/// All new components of `kind` within `budget`.
pub fn generate_from_bank(kind: Kind, ctx: &GenContext, budget: Cost) -> Vec<Component> {
    let mut out = vec![];
    let r0 = ctx.start(budget);
    match kind {
        Kind::AggChain => {
            for (f, func) in agg_funcs(ctx, &r0) {
                let r1 = ctx.after(&r0, &f);
                for p in ctx.pick(Category::ReferencableChain, &r1, agg_param_constraints(func)) {
                    out.push(Component::agg_chain(func, p));
                }
            }
        }
        Kind::WindowFuncChain => {
            for f in ctx.pick(Category::Is(Kind::WindowFunc), &r0, vec![]) {
                let Some(func) = f.node().as_window_func().copied() else {
                    continue;
                };
                let r1 = ctx.after(&r0, &f);
                for p in ctx.pick(Category::Chain, &r1, vec![]) {
                    out.push(Component::window_func_chain(func, p));
                }
            }
        }
        Kind::Aggregation => {
            for (f, func) in agg_funcs(ctx, &r0) {
                let r1 = ctx.after(&r0, &f);
                for p in ctx.pick(Category::ReferencableChain, &r1, agg_param_constraints(func)) {
                    out.push(Component::aggregation(func, p.clone(), false));
                    out.push(Component::aggregation(func, p, true));
                }
            }
        }
        Kind::PartitionList => {
            let chains = ctx.pick(Category::ReferencableChain, &r0, vec![]);
            out.extend(ctx.lists(chains).into_iter().map(Component::partition_list));
        }
        Kind::WindowFuncClause => {
            for f in ctx.pick(Category::Is(Kind::WindowFunc), &r0, vec![]) {
                if let Some(func) = f.node().as_window_func() {
                    out.push(Component::window_func_clause(*func));
                }
            }
        }
        Kind::GroupByList => {
            let chains = ctx.pick(Category::ReferencableChain, &r0, vec![]);
            out.extend(ctx.lists(chains).into_iter().map(Component::group_by_list));
        }
        Kind::OrderByItem => {
            for chain in ctx.pick(Category::ReferencableChain, &r0, vec![]) {
                let r1 = ctx.after(&r0, &chain);
                for d in ctx.pick(Category::Is(Kind::OrderDir), &r1, vec![]) {
                    if let Some(dir) = d.node().as_order_dir() {
                        out.push(Component::order_by_item(chain.clone(), *dir));
                    }
                }
            }
        }
        Kind::OrderByList => {
            let items = ctx.pick(Category::Is(Kind::OrderByItem), &r0, vec![]);
            out.extend(ctx.lists(items).into_iter().map(Component::order_by_list));
        }
        Kind::PredicateLogic => generate_logic(ctx, &r0, &mut out),
        Kind::PredicateOp => generate_comparison(ctx, &r0, &mut out),
        Kind::WindowCallAgg | Kind::WindowCallFunc => generate_window_call(kind, ctx, &r0, &mut out),
        Kind::TableSource => {
            for t in ctx.pick(Category::Is(Kind::Table), &r0, vec![]) {
                let candidate = Component::table_source(t, None);
                if !ctx.bank.contains(&candidate) {
                    out.push(candidate);
                }
            }
            return out;
        }
        Kind::QuerySource => {
            for q in ctx.pick(Category::Is(Kind::Query), &r0, vec![]) {
                out.push(Component::query_source(q, None));
            }
        }
        Kind::Join => generate_join(ctx, &r0, &mut out),
        Kind::Query => return generate_query(ctx, &r0),
        _ => (),
    }
    out.retain(|c| ctx.accept(c, budget));
    out
}

fn agg_funcs(ctx: &GenContext, r: &Remainder) -> Vec<(Component, AggFunc)> {
    ctx.pick(Category::Is(Kind::AggFunc), r, vec![])
        .into_iter()
        .filter_map(|f| {
            let func = f.node().as_agg_func().copied()?;
            Some((f, func))
        })
        .collect()
}

fn agg_param_constraints(func: AggFunc) -> Vec<Constraint> {
    match func {
        AggFunc::Count => vec![],
        _ => vec![Constraint::DataTypeIn(vec![DataType::Number])],
    }
}

fn generate_comparison(ctx: &GenContext, r0: &Remainder, out: &mut Vec<Component>) {
    for o in ctx.pick(Category::Is(Kind::CompareOp), r0, vec![]) {
        let Some(op) = o.node().as_compare_op().copied() else {
            continue;
        };
        let types = match op {
            CompareOp::Eq | CompareOp::Neq => {
                vec![DataType::Number, DataType::Str]
            }
            _ => vec![DataType::Number],
        };
        let r1 = ctx.after(r0, &o);
        let lhs = ctx.pick(
            Category::SingleValue,
            &r1,
            vec![Constraint::NotNone, Constraint::DataTypeIn(types)],
        );
        for l in lhs {
            let Some(dt) = l.data_type() else {
                continue;
            };
            let r2 = ctx.after(&r1, &l);
            let rhs = ctx.pick(
                Category::SingleValue,
                &r2,
                vec![
                    Constraint::NotNone,
                    Constraint::DataTypeIn(vec![dt]),
                    Constraint::NotIn(vec![l.clone()]),
                ],
            );
            for r in rhs {
                out.push(Component::predicate_op(l.clone(), op, r));
            }
        }
    }
}

fn generate_logic(ctx: &GenContext, r0: &Remainder, out: &mut Vec<Component>) {
    for o in ctx.pick(Category::Is(Kind::LogicOp), r0, vec![]) {
        let Some(op) = o.node().as_logic_op().copied() else {
            continue;
        };
        let r1 = ctx.after(r0, &o);
        for l in ctx.pick(Category::Predicate, &r1, vec![Constraint::NotNone]) {
            let r2 = ctx.after(&r1, &l);
            let rhs = ctx.pick(
                Category::Predicate,
                &r2,
                vec![Constraint::NotNone, Constraint::no_duplicates_of(&l)],
            );
            for r in rhs {
                out.push(Component::predicate_logic(l.clone(), op, r));
            }
        }
    }
}

fn generate_window_call(kind: Kind, ctx: &GenContext, r0: &Remainder, out: &mut Vec<Component>) {
    let (func_kind, order_constraints) = match kind {
        Kind::WindowCallAgg => (Kind::Aggregation, vec![]),
        _ => (Kind::WindowFuncClause, vec![Constraint::NotNone]),
    };
    for func in ctx.pick(Category::Is(func_kind), r0, vec![]) {
        let r1 = ctx.after(r0, &func);
        for partition in ctx.pick(Category::Partition, &r1, vec![]) {
            let r2 = ctx.after(&r1, &partition);
            for order_by in ctx.pick(Category::OrderBy, &r2, order_constraints.clone()) {
                if partition.is_absent() && order_by.is_absent() {
                    continue;
                }
                let candidate = match kind {
                    Kind::WindowCallAgg => {
                        Component::window_call_agg(func.clone(), partition.clone(), order_by)
                    }
                    _ => Component::window_call_func(func.clone(), partition.clone(), order_by),
                };
                out.push(candidate);
            }
        }
    }
}

fn generate_join(ctx: &GenContext, r0: &Remainder, out: &mut Vec<Component>) {
    let depth = ctx.max_source_depth();
    for l in ctx.pick(Category::Source, r0, vec![Constraint::MaxDepth(depth)]) {
        let r1 = ctx.after(r0, &l);
        let l_chains: HashSet<Component> = l.provided_chains().into_iter().collect();
        let rights = ctx.pick(
            Category::Source,
            &r1,
            vec![
                Constraint::NotIn(vec![l.clone()]),
                Constraint::MaxDepth(depth),
                Constraint::DisjointProvidedChains(l_chains.clone()),
            ],
        );
        for r in rights {
            let r2 = ctx.after(&r1, &r);
            let r_chains: HashSet<Component> = r.provided_chains().into_iter().collect();
            for t in ctx.pick(Category::Is(Kind::JoinType), &r2, vec![]) {
                let Some(join_type) = t.node().as_join_type().copied() else {
                    continue;
                };
                let r3 = ctx.after(&r2, &t);
                let both: HashSet<Component> = l_chains.union(&r_chains).cloned().collect();
                let ons = ctx.pick(
                    Category::Predicate,
                    &r3,
                    vec![
                        Constraint::NotNone,
                        Constraint::FulfilledByProvidedChains(both),
                        Constraint::TwoSideDifferentSource(l_chains.clone(), r_chains.clone()),
                        Constraint::NoAggInPredicate,
                    ],
                );
                for on in ons {
                    out.push(Component::join(l.clone(), r.clone(), join_type, on));
                }
            }
        }
    }
}

/// Group lists expose the chains a grouped query may use outside aggregates.
fn group_chains(group: &Component) -> HashSet<Component> {
    match group.node() {
        Node::GroupByList(items) => items.iter().cloned().collect(),
        _ => HashSet::new(),
    }
}

/// A query that only projects columns of its source, with no other clause.
pub fn is_trivial_select(query: &Component) -> bool {
    let Some(q) = query.node().as_query() else {
        return false;
    };
    let source: HashSet<Component> = q.source.provided_chains().into_iter().collect();
    q.where_clause.is_absent()
        && q.having.is_absent()
        && q.group_by.is_absent()
        && q.order_by.is_absent()
        && !q.distinct
        && query.provided_chains().iter().all(|c| source.contains(c))
}

fn generate_query(ctx: &GenContext, r0: &Remainder) -> Vec<Component> {
    let mut out = vec![];
    let sources = ctx.pick(
        Category::Source,
        r0,
        vec![Constraint::MaxDepth(ctx.max_source_depth())],
    );
    for source in sources {
        let r1 = ctx.after(r0, &source);
        let provided = source.provided_chains();
        let wheres = ctx.pick(
            Category::Predicate,
            &r1,
            vec![
                Constraint::fulfilled_by(provided.clone()),
                Constraint::NoAggInPredicate,
            ],
        );
        for where_clause in wheres {
            let r2 = ctx.after(&r1, &where_clause);
            let groups = ctx.pick(
                Category::GroupBy,
                &r2,
                vec![Constraint::fulfilled_by(provided.clone())],
            );
            for group_by in groups {
                let r3 = ctx.after(&r2, &group_by);
                let grouped = group_chains(&group_by);
                let havings = ctx.pick(
                    Category::Predicate,
                    &r3,
                    vec![
                        Constraint::fulfilled_by(provided.clone()),
                        Constraint::ColumnEitherInGroupByOrAggregation(grouped.clone()),
                    ],
                );
                for having in havings {
                    let r4 = ctx.after(&r3, &having);
                    let parts = QueryParts {
                        source: &source,
                        where_clause: &where_clause,
                        group_by: &group_by,
                        having: &having,
                    };
                    let select_constraints = |last: Constraint| {
                        vec![
                            Constraint::fulfilled_by(provided.clone()),
                            Constraint::NotNone,
                            last,
                        ]
                    };
                    if !group_by.is_absent() {
                        let items = ctx.pick(
                            Category::SelectItem,
                            &r4,
                            select_constraints(Constraint::ColumnEitherInGroupByOrAggregation(
                                grouped.clone(),
                            )),
                        );
                        finish_query(ctx, &r4, r0.budget, &parts, items, false, &mut out);
                        continue;
                    }
                    let items = ctx.pick(
                        Category::SelectItem,
                        &r4,
                        select_constraints(Constraint::AggregationOnly),
                    );
                    finish_query(ctx, &r4, r0.budget, &parts, items, false, &mut out);
                    if having.is_absent() {
                        let items = ctx.pick(
                            Category::SelectItem,
                            &r4,
                            select_constraints(Constraint::NonAggregationOnly),
                        );
                        finish_query(ctx, &r4, r0.budget, &parts, items, true, &mut out);
                    }
                }
            }
        }
    }
    out
}

struct QueryParts<'c> {
    source: &'c Component,
    where_clause: &'c Component,
    group_by: &'c Component,
    having: &'c Component,
}

/// Builds the SELECT over every admissible item, then each ORDER BY and both DISTINCT forms.
fn finish_query(
    ctx: &GenContext,
    r4: &Remainder,
    budget: Cost,
    parts: &QueryParts,
    items: Vec<Component>,
    skip_trivial: bool,
    out: &mut Vec<Component>,
) {
    if items.is_empty() {
        return;
    }
    let select = Component::select_clause(items);
    let r5 = ctx.after(r4, &select);
    let orders = ctx.pick(
        Category::OrderBy,
        &r5,
        vec![Constraint::fulfilled_by(select.provided_chains())],
    );
    for order_by in orders {
        for distinct in [true, false] {
            let candidate = Component::query(Query {
                select: select.clone(),
                source: parts.source.clone(),
                where_clause: parts.where_clause.clone(),
                group_by: parts.group_by.clone(),
                having: parts.having.clone(),
                order_by: order_by.clone(),
                distinct,
            });
            if ctx.accept(&candidate, budget) && !(skip_trivial && is_trivial_select(&candidate)) {
                out.push(candidate);
            }
        }
    }
}

#[cfg(test)]
use crate::dsl::testing::{col, scenario_query};
#[cfg(test)]
use crate::dsl::{terminal_library, JoinType};

#[cfg(test)]
fn seeded(query: &Component) -> Bank {
    let mut bank = Bank::new();
    bank.extend(query.all_components());
    bank.extend(terminal_library());
    bank
}

#[test]
fn test_generate_comparisons_respect_types() {
    let (query, customers, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let mut bank = seeded(&query);
    bank.insert(Component::string_const("bob"));
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let preds = generate_from_bank(Kind::PredicateOp, &ctx, 2);
    assert!(!preds.is_empty());
    for p in &preds {
        println!("Running case: {}", p);
        let c = p.node().as_predicate_op().unwrap();
        assert_eq!(c.larg.data_type(), c.rarg.data_type());
        assert_ne!(c.larg, c.rarg);
        if c.larg.data_type() == Some(DataType::Str) {
            assert!(matches!(c.op, CompareOp::Eq | CompareOp::Neq));
        }
        assert!(!bank.contains(p));
        assert!(est.cost(p) <= 2);
    }
    let name_is_bob = Component::predicate_op(
        col(&customers, "name"),
        CompareOp::Eq,
        Component::string_const("bob"),
    );
    assert!(preds.contains(&name_is_bob));
    let swapped_where = Component::predicate_op(
        Component::int_const(5),
        CompareOp::Eq,
        col(&orders, "id"),
    );
    assert!(preds.contains(&swapped_where));
}

#[test]
fn test_generate_swapped_join_at_cost_zero() {
    let (query, customers, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let bank = seeded(&query);
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let on = Component::predicate_op(
        col(&customers, "id"),
        CompareOp::Eq,
        col(&orders, "cust"),
    );
    let swapped = Component::join(
        Component::table_source(orders, None),
        Component::table_source(customers, None),
        JoinType::Inner,
        on,
    );
    let joins = generate_from_bank(Kind::Join, &ctx, 0);
    assert!(joins.contains(&swapped));
    assert_eq!(est.cost(&swapped), 0);
    for j in &joins {
        assert!(!j.node().as_join().unwrap().on.is_absent());
    }
}

#[test]
fn test_generate_queries_keep_aggregates_out_of_where() {
    let (query, _, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let mut bank = seeded(&query);
    let agg = Component::aggregation(AggFunc::Max, col(&orders, "id"), false);
    bank.insert(agg.clone());
    bank.insert(Component::predicate_op(
        agg,
        CompareOp::Eq,
        Component::int_const(5),
    ));
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let queries = generate_from_bank(Kind::Query, &ctx, 2);
    assert!(!queries.is_empty());
    for q in &queries {
        let parts = q.node().as_query().unwrap();
        assert!(Constraint::NoAggInPredicate.verify(&parts.where_clause));
        assert!(!is_trivial_select(q));
        assert!(est.cost(q) <= 2);
    }
}

#[test]
fn test_group_by_lists_are_bounded() {
    let (query, _, _) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig {
        list_length_limit: 2,
        ..SynthConfig::default()
    };
    let bank = seeded(&query);
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let lists = generate_from_bank(Kind::GroupByList, &ctx, 10);
    assert!(!lists.is_empty());
    for l in lists {
        let n = l.node().as_group_by_list().unwrap().len();
        assert!((1..=2).contains(&n));
    }
}

#[test]
fn test_is_trivial_select() {
    let (query, _, _) = scenario_query();
    assert!(!is_trivial_select(&query));
    let parts = query.node().as_query().unwrap();
    let plain = Component::query(Query {
        where_clause: Component::absent(),
        ..parts.clone()
    });
    assert!(is_trivial_select(&plain));
}

#[test]
fn test_higher_budget_keeps_cheaper_results() {
    let (query, _, _) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let bank = seeded(&query);
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    for kind in NON_TERMINAL_ORDER {
        println!("Running case: {:?}", kind);
        let lower: HashSet<Component> = generate_from_bank(kind, &ctx, 0).into_iter().collect();
        let higher: HashSet<Component> = generate_from_bank(kind, &ctx, 1).into_iter().collect();
        assert!(lower.is_subset(&higher));
    }
}

#[test]
fn test_generated_joins_satisfy_their_constraints() {
    let (query, _, _) = scenario_query();
    let est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let bank = seeded(&query);
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let joins = generate_from_bank(Kind::Join, &ctx, 1);
    assert!(!joins.is_empty());
    for j in &joins {
        println!("Running case: {}", j);
        let parts = j.node().as_join().unwrap();
        let left: HashSet<Component> = parts.larg.provided_chains().into_iter().collect();
        let right: HashSet<Component> = parts.rarg.provided_chains().into_iter().collect();
        let both: HashSet<Component> = left.union(&right).cloned().collect();
        let checks = ConstraintSet::new()
            .with(Constraint::NotNone)
            .with(Constraint::FulfilledByProvidedChains(both))
            .with(Constraint::TwoSideDifferentSource(left.clone(), right))
            .with(Constraint::NoAggInPredicate);
        assert!(checks.verify(&parts.on));
        assert!(Constraint::DisjointProvidedChains(left).verify(&parts.rarg));
        assert!(Constraint::MaxDepth(ctx.max_source_depth()).verify(&parts.larg));
        assert!(Constraint::MaxDepth(ctx.max_source_depth()).verify(&parts.rarg));
    }
}

#[test]
fn test_grouped_queries_select_grouped_columns_or_aggregates() {
    let (query, _, orders) = scenario_query();
    let mut est = CostEstimator::new(&query);
    let config = SynthConfig::default();
    let mut bank = seeded(&query);
    let group_by = Component::group_by_list(vec![col(&orders, "cust")]);
    let count = Component::aggregation(AggFunc::Count, col(&orders, "id"), false);
    let having = Component::predicate_op(count.clone(), CompareOp::Lt, Component::int_const(5));
    let mut free = crate::dsl::ComponentCounter::new();
    for c in [&group_by, &count, &having] {
        free.add(c.counter());
        bank.insert(c.clone());
    }
    est.update_allow_cost_model(&free);
    let ctx = GenContext {
        bank: &bank,
        estimator: &est,
        config: &config,
    };
    let queries = generate_from_bank(Kind::Query, &ctx, 1);
    let grouped: Vec<&Component> = queries
        .iter()
        .filter(|q| !q.node().as_query().unwrap().group_by.is_absent())
        .collect();
    assert!(!grouped.is_empty());
    for q in grouped {
        println!("Running case: {}", q);
        let parts = q.node().as_query().unwrap();
        let groups = group_chains(&parts.group_by);
        let checks = ConstraintSet::new()
            .with(Constraint::fulfilled_by(parts.source.provided_chains()))
            .with(Constraint::ColumnEitherInGroupByOrAggregation(groups));
        for item in parts.select.node().as_select_clause().unwrap() {
            assert!(checks.verify(item));
        }
        assert!(checks.verify(&parts.having));
    }
}
