use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use querysynth::SynthConfig;

/// Prints candidate queries for an input query, cheapest first.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File with the `CREATE TABLE` statements of the schema.
    #[arg(long)]
    schema: PathBuf,
    /// The query to synthesize candidates for.
    #[arg(long)]
    query: String,
    /// Stop after this many candidates.
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    max_cost: Option<i64>,
    #[arg(long, default_value_t = 2)]
    depth_limit: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let schema_sql = fs::read_to_string(&args.schema)
        .with_context(|| format!("Failed to read schema from {}", args.schema.display()))?;
    let config = SynthConfig {
        max_cost: args.max_cost,
        depth_limit: args.depth_limit,
        ..SynthConfig::default()
    };
    let candidates = querysynth::synthesize(&schema_sql, &args.query, config)?;
    for candidate in candidates.take(args.limit) {
        let c = candidate?;
        println!("{}\t{}", c.cost, c.sql);
    }
    Ok(())
}
