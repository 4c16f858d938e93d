//! The counterexample-guided loop around the synthesizer.
//!
//! Each candidate is handed to an external [`Oracle`] together with the counterexamples
//! collected so far. Accepted candidates are reported; rejected ones only refresh the
//! counterexamples. An oracle that fails is counted and its candidate is reported anyway.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::synthesizer::{self, Synthesizer};

/// Decides whether a candidate is equivalent to the original query.
pub trait Oracle {
    type Counterexample;

    /// Returns whether `candidate` matches `original` and the counterexamples to use next.
    fn test(
        &mut self,
        candidate: &str,
        original: &str,
        counterexamples: &[Self::Counterexample],
    ) -> anyhow::Result<(bool, Vec<Self::Counterexample>)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Equivalent,
    OracleBreak(String),
}

/// Running totals over one optimization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub generated: usize,
    pub passed: usize,
    pub oracle_breaks: usize,
    pub synthesis_time: Duration,
    pub oracle_time: Duration,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub sql: String,
    pub verdict: Verdict,
    pub stats: Stats,
}

pub struct Optimizer<O: Oracle> {
    synthesizer: Synthesizer,
    oracle: O,
    original: String,
    counterexamples: Vec<O::Counterexample>,
    stats: Stats,
}

impl<O: Oracle> Optimizer<O> {
    pub fn new(synthesizer: Synthesizer, original: &str, oracle: O) -> Optimizer<O> {
        Optimizer {
            synthesizer,
            oracle,
            original: String::from(original),
            counterexamples: vec![],
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn report(&self, sql: String, verdict: Verdict) -> Report {
        Report {
            sql,
            verdict,
            stats: self.stats.clone(),
        }
    }
}

impl<O: Oracle> Iterator for Optimizer<O> {
    type Item = Result<Report, synthesizer::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = Instant::now();
            let item = self.synthesizer.next();
            self.stats.synthesis_time += start.elapsed();
            let candidate = match item? {
                Ok(c) => c,
                Err(e) => return Some(Err(e)),
            };
            self.stats.generated += 1;

            let start = Instant::now();
            let result = self
                .oracle
                .test(&candidate.sql, &self.original, &self.counterexamples);
            self.stats.oracle_time += start.elapsed();
            match result {
                Ok((true, _)) => {
                    self.stats.passed += 1;
                    return Some(Ok(self.report(candidate.sql, Verdict::Equivalent)));
                }
                Ok((false, counterexamples)) => {
                    debug!(cost = candidate.cost, "Rejected {}", candidate.sql);
                    self.counterexamples = counterexamples;
                }
                Err(e) => {
                    self.stats.oracle_breaks += 1;
                    warn!(error = %e, "Oracle failed on {}", candidate.sql);
                    let message = format!("{:#}", e);
                    return Some(Ok(self.report(candidate.sql, Verdict::OracleBreak(message))));
                }
            }
        }
    }
}

#[cfg(test)]
use crate::config::SynthConfig;
#[cfg(test)]
use crate::pt_to_ast::pt_select_statement_to_ast;
#[cfg(test)]
use crate::schema::Schema;

/// Accepts candidates that mention `needle`, fails on the placeholder, and records how many
/// counterexamples it was shown.
#[cfg(test)]
struct NeedleOracle {
    needle: &'static str,
    shown: Vec<usize>,
}

#[cfg(test)]
impl Oracle for NeedleOracle {
    type Counterexample = String;

    fn test(
        &mut self,
        candidate: &str,
        _original: &str,
        counterexamples: &[String],
    ) -> anyhow::Result<(bool, Vec<String>)> {
        self.shown.push(counterexamples.len());
        if candidate.contains("VALUES") {
            anyhow::bail!("cannot run placeholder");
        }
        if candidate.contains(self.needle) {
            return Ok((true, counterexamples.to_vec()));
        }
        let mut next = counterexamples.to_vec();
        next.push(String::from(candidate));
        Ok((false, next))
    }
}

#[test]
fn test_optimizer_counts() {
    let sql = "SELECT customers.name FROM customers JOIN orders ON customers.id = orders.cust \
               WHERE orders.id = 5";
    let schema = Schema::from_sql(
        "CREATE TABLE customers (id int, name varchar); CREATE TABLE orders (id int, cust int)",
    )
    .unwrap();
    let config = SynthConfig {
        max_cost: Some(0),
        ..SynthConfig::default()
    };
    let synthesizer = Synthesizer::new(&pt_select_statement_to_ast(sql).unwrap(), &schema, config);
    let oracle = NeedleOracle {
        needle: "FROM \"orders\"",
        shown: vec![],
    };
    let mut optimizer = Optimizer::new(synthesizer, sql, oracle);

    let first = optimizer.next().unwrap().unwrap();
    assert_eq!(first.verdict, Verdict::OracleBreak(String::from("cannot run placeholder")));
    assert_eq!(first.stats.generated, 1);
    assert_eq!(first.stats.oracle_breaks, 1);

    // The literal is rejected, then the swapped join is accepted.
    let second = optimizer.next().unwrap().unwrap();
    assert_eq!(second.verdict, Verdict::Equivalent);
    assert!(second.sql.contains("FROM \"orders\" AS \"T_orders_0\" INNER JOIN \"customers\""));
    assert_eq!(second.stats.passed, 1);
    assert!(second.stats.generated >= 3);
    assert_eq!(optimizer.oracle.shown[..2], [0, 0]);
    assert_eq!(optimizer.oracle.shown[2], 1);
}
