//! Unified error taxonomy for the optimization core.
//!
//! Every fallible operation in this crate returns `CoreError` (or a
//! component-local error that converts into it via `#[from]`). `anyhow` is
//! not used at this layer; it is reserved for the CLI binary's top-level
//! error reporting.

use thiserror::Error;

/// Top-level error type for the optimization core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid `GameConfig`, missing seed policy, unreadable scenario.
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A policy violated a structural or semantic constraint.
    #[error("validation error: {0}")]
    Validation(String),

    /// LLM transport/timeout/parse failure.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Simulator failure for one Monte Carlo sample, or a quorum failure
    /// across a full evaluation batch.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Persistence write failed after exhausting the retry budget.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The run was cancelled externally.
    #[error("run cancelled: {0}")]
    Cancelled(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("simulator error: {0}")]
    Simulator(#[from] cashsim_engine::orchestrator::SimulationError),
}

pub type CoreResult<T> = Result<T, CoreError>;
