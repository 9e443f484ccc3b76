//! `MockStep` — a test double for `StepHandler`.
//!
//! Useful in unit tests where the behaviour of a step matters less than
//! whether and how often the sequencer invoked it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{StepError, StepHandler, StepId, StepOps, StepView, Transition};

/// Behaviour injected into `MockStep` at construction time.
pub enum MockBehaviour<S, St, Cx> {
    /// Return a fixed transition.
    Return(Transition<S, St, Cx>),
    /// Fail with a `StepError::Failed`.
    Fail(String),
}

/// A mock handler that records every invocation it receives and returns a
/// programmer-specified result.
pub struct MockStep<S, St, Cx> {
    behaviour: MockBehaviour<S, St, Cx>,
    /// All views seen by this handler (in invocation order).
    pub calls: Arc<Mutex<Vec<StepView<S, St, Cx>>>>,
}

impl<S, St, Cx> MockStep<S, St, Cx> {
    /// Create a mock that always succeeds with the given transition.
    pub fn returning(transition: Transition<S, St, Cx>) -> Self {
        Self {
            behaviour: MockBehaviour::Return(transition),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with the given message.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Shared handle to the recorded invocations, for asserting after the
    /// mock itself has been moved into a handler table.
    pub fn calls_handle(&self) -> Arc<Mutex<Vec<StepView<S, St, Cx>>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl<S, St, Cx> StepHandler<S, St, Cx> for MockStep<S, St, Cx>
where
    S: StepId,
    St: Clone + Send + Sync + 'static,
    Cx: Clone + Send + Sync + 'static,
{
    async fn run(
        &self,
        view: StepView<S, St, Cx>,
        _ops: Arc<dyn StepOps<S>>,
    ) -> Result<Transition<S, St, Cx>, StepError> {
        self.calls.lock().unwrap().push(view);

        match &self.behaviour {
            MockBehaviour::Return(t) => Ok(t.clone()),
            MockBehaviour::Fail(msg) => Err(StepError::Failed(msg.clone())),
        }
    }
}
