//! Error taxonomy for the execution engine.
//!
//! The five categories a step outcome can land in are closed states on
//! [`Status`](crate::model::Status), not error types. The errors here cover
//! everything that happens on the way to an outcome: a substitution miss, a
//! matcher miss, a condition that is not yet true, a broken step, an
//! exhausted retry budget, or the scheduler winding the run down.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A `{NAME}` token referenced a variable absent from every scope frame.
    /// Carries the literal step text so the report can show where.
    #[error("undefined variable `{name}` in: {text}")]
    UndefinedVariable { name: String, text: String },

    /// The external matcher had no implementation for this step text.
    /// Surfaces as an `undefined` outcome, never as a crash.
    #[error("no step implementation matches: {text}")]
    NoMatchingStep { text: String },

    /// An awaited condition is not true yet. Fully absorbed by the retry
    /// engine unless it persists past the timeout.
    #[error("condition not met: {0}")]
    Recoverable(String),

    /// Non-recoverable failure inside a step implementation. Aborts the
    /// remaining retries immediately.
    #[error("step failed: {0}")]
    StepFailed(String),

    /// The retry engine exhausted its budget. Wraps the last attempt's
    /// diagnostic, not an aggregate of all attempts.
    #[error("timed out after {timeout:?}: {last}")]
    Timeout { timeout: Duration, last: String },

    /// The run is being torn down; observed at poll and step boundaries.
    #[error("aborted: stop-on-failure triggered")]
    SchedulerAbort,

    /// Substep call structure exceeded the bounded depth.
    #[error("substep nesting exceeded depth {0}")]
    DepthExceeded(usize),

    /// Invalid retry policy or run configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serializing run summary: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the retry engine may try again after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Recoverable(_))
    }

    /// Convenience constructor for "condition not yet true" signals.
    pub fn not_yet(msg: impl Into<String>) -> Self {
        EngineError::Recoverable(msg.into())
    }

    /// Convenience constructor for non-recoverable step failures.
    pub fn failed(msg: impl Into<String>) -> Self {
        EngineError::StepFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
