//! Core models for the sequencer engine.

use serde_json::Value;

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One queued request: the step a chain should start at, plus one-shot input
/// for that chain's *first* handler invocation only. Automatic advances
/// within the chain see `Value::Null`.
#[derive(Debug, Clone)]
pub struct WorkItem<S> {
    /// Step the chain starts at.
    pub step: S,
    /// Input consumed by the first invocation; never persists across hops.
    pub payload: Value,
}

impl<S> WorkItem<S> {
    /// Create a work item carrying payload for its first invocation.
    pub fn new(step: S, payload: Value) -> Self {
        Self { step, payload }
    }

    /// Create a payload-less work item (engine-internal re-enqueues).
    pub fn bare(step: S) -> Self {
        Self {
            step,
            payload: Value::Null,
        }
    }
}
