pub mod alternatives;
pub mod ast;
pub mod bank;
pub mod concretize;
pub mod config;
pub mod constraints;
pub mod cost;
pub mod data_type;
pub mod dsl;
pub mod generate;
pub mod optimize;
pub mod parser;
pub mod pt_to_ast;
pub mod schema;
pub mod synthesizer;
pub mod translate;
pub mod trim;

extern crate pest;
#[macro_use]
extern crate pest_derive;

use anyhow::Context;

pub use config::SynthConfig;
pub use optimize::{Optimizer, Oracle, Report, Stats, Verdict};
pub use schema::Schema;
pub use synthesizer::{Candidate, Synthesizer};

/// Parses `schema_sql` (`CREATE TABLE` statements) and `query`, and starts a candidate stream.
pub fn synthesize(schema_sql: &str, query: &str, config: SynthConfig) -> anyhow::Result<Synthesizer> {
    let schema = Schema::from_sql(schema_sql).context("Failed to parse schema")?;
    let stmt = pt_to_ast::pt_select_statement_to_ast(query)
        .with_context(|| format!("Failed to parse query: {}", query))?;
    Ok(Synthesizer::new(&stmt, &schema, config))
}

/// Like [`synthesize`], but only reports candidates that `oracle` accepts or fails on.
pub fn optimize<O: Oracle>(
    schema_sql: &str,
    query: &str,
    config: SynthConfig,
    oracle: O,
) -> anyhow::Result<Optimizer<O>> {
    let synthesizer = synthesize(schema_sql, query, config)?;
    Ok(Optimizer::new(synthesizer, query, oracle))
}
