//! Knobs for one synthesis run.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    /// Maximum nesting depth of generated queries.
    pub depth_limit: usize,
    /// Maximum length of generated GROUP BY, PARTITION BY and ORDER BY lists.
    pub list_length_limit: usize,
    /// Above this many output columns, only the literal output chains are requested.
    pub max_output_arity: usize,
    /// The stream ends instead of widening the cost limit past this value.
    pub max_cost: Option<i64>,
    /// Advisory only: a warning is logged once a run takes longer than this.
    pub generation_budget: Option<Duration>,
    /// Suppress candidates whose SQL text was already yielded.
    pub dedup_rendered: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            depth_limit: 2,
            list_length_limit: 2,
            max_output_arity: 8,
            max_cost: None,
            generation_budget: None,
            dedup_rendered: true,
        }
    }
}
