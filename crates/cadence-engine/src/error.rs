//! Error types for the host binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during host startup and the tick loop.

/// Top-level error for the host binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// Queue construction or enqueueing failed.
    #[error("queue error: {source}")]
    Queue {
        /// The underlying queue error.
        #[from]
        source: cadence_core::queue::QueueError,
    },

    /// Job construction failed.
    #[error("job error: {source}")]
    Job {
        /// The underlying job error.
        #[from]
        source: cadence_core::job::JobError,
    },
}
