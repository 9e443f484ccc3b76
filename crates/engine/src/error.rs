//! Engine-level error type.

use thiserror::Error;

use steps::StepError;

/// The normalized error value delivered to the `on_error` callback.
///
/// Every variant is terminal for its chain: the sequencer stalls (see
/// [`Sequencer::is_stalled`](crate::Sequencer::is_stalled)) and `reset` is
/// the only recovery path.
#[derive(Debug, Error)]
pub enum SequencerError<S: std::fmt::Debug> {
    /// A chain reached a step with no handler-table entry. The table must be
    /// total over the reachable step domain; this is a configuration error
    /// surfaced at runtime.
    #[error("no handler registered for step {0:?}")]
    UnregisteredStep(S),

    /// A step's handler invocation failed.
    #[error("handler for step {step:?} failed: {source}")]
    StepFailed {
        step: S,
        #[source]
        source: StepError,
    },
}
