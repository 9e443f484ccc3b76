//! Step-level error type.

use thiserror::Error;

/// Errors returned by a step handler's `run` method.
///
/// Every failure is terminal for its chain: the sequencer reports it through
/// the configured error callback and stops advancing. There is no retry
/// variant by design — retry policy belongs to the collaborator (the error
/// callback may itself re-enter the sequencer).
#[derive(Debug, Error)]
pub enum StepError {
    /// The handler could not complete its operation.
    #[error("step handler failed: {0}")]
    Failed(String),

    /// An arbitrary error bubbled out of the handler's own dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    /// Shorthand for a message-only failure.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
