//! The crate-level error type.
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while building or running a benchmark.
#[derive(Error, Debug)]
pub enum Error {
    /// A CLI argument failed to parse or combines invalid options.
    #[error("argument error: {0}")]
    ArgParseError(String),

    /// The user's `init` hook raised an error.
    #[error("init hook failed: {0}")]
    InitFailed(#[source] anyhow::Error),

    /// The user's `init_runner` hook raised an error for a specific worker.
    #[error("init_runner hook failed for worker {worker_id}: {source}")]
    WorkerInitFailed {
        /// The id of the worker whose `init_runner` hook failed.
        worker_id: u32,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A `runner` invocation raised an error. This is recorded, not fatal to the Job.
    #[error("runner fault in worker {worker_id}: {source}")]
    RunnerFault {
        /// The id of the worker that faulted.
        worker_id: u32,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A requested configuration is invalid (e.g. squeeze with multiple fragments).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Starting an isolated runtime instance failed.
    #[error("failed to start isolated runtime: {0}")]
    IsolationStartFailed(String),

    /// A control-plane call to an isolated runtime instance timed out.
    #[error("isolated runtime call timed out after {0:?}")]
    IsolationTimeout(Duration),

    /// The top-level call was cancelled (Ctrl+C) before a result was produced.
    /// Workers were stopped and the Job released; no partial result is available.
    #[error("cancelled")]
    Cancelled,

    /// Any other error, typically raised by a built-in workload body.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
