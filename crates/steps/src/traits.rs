//! The `StepHandler` trait and the types that flow through an invocation.
//!
//! Defined here (in the steps crate) so both the engine and individual
//! handler implementations can import them without a circular dependency.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::StepError;

// ---------------------------------------------------------------------------
// StepId
// ---------------------------------------------------------------------------

/// Marker for types usable as step identifiers.
///
/// A step identifier is an opaque, comparable tag over a finite domain —
/// in practice a small user-defined enum, which gives the handler table a
/// compile-time-checked key space. Blanket-implemented for anything with the
/// right bounds.
pub trait StepId: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static {}

impl<T> StepId for T where T: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static {}

// ---------------------------------------------------------------------------
// StepView
// ---------------------------------------------------------------------------

/// Read-only snapshot handed to a handler at the start of its invocation.
///
/// `state` and `context` are clones of the values committed as of that
/// instant; because the sequencer replaces both wholesale on every commit
/// (never mutating in place) and runs at most one invocation at a time, the
/// snapshot is always the latest committed data.
#[derive(Debug, Clone)]
pub struct StepView<S, St, Cx> {
    /// Externally visible workflow state.
    pub state: St,
    /// Engine-private bookkeeping, never exposed outside handlers.
    pub context: Cx,
    /// The step being executed.
    pub step: S,
    /// One-shot input for the first invocation of a chain; `Value::Null` for
    /// every automatic advance after it.
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// What a handler returns: where the chain goes next, plus optional
/// replacements for state and context.
///
/// Omitted fields leave the corresponding value untouched; a supplied field
/// replaces it wholesale.
#[derive(Debug, Clone)]
pub struct Transition<S, St, Cx> {
    /// The next step in the chain. If the table maps it to the terminal
    /// marker the chain ends there.
    pub next: S,
    /// Replacement for the external state, if any.
    pub state: Option<St>,
    /// Replacement for the internal context, if any.
    pub context: Option<Cx>,
}

impl<S, St, Cx> Transition<S, St, Cx> {
    /// Advance to `next` with no state or context change.
    pub fn to(next: S) -> Self {
        Self {
            next,
            state: None,
            context: None,
        }
    }

    /// Replace the external state when this transition commits.
    pub fn with_state(mut self, state: St) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the internal context when this transition commits.
    pub fn with_context(mut self, context: Cx) -> Self {
        self.context = Some(context);
        self
    }
}

// ---------------------------------------------------------------------------
// StepOps
// ---------------------------------------------------------------------------

/// The two capabilities a handler may use to re-enter the sequencer,
/// passed explicitly into every invocation.
///
/// Both are fire-and-forget: `act` appends to the same queue the invocation
/// was drawn from (new items run only after the in-flight chain resolves,
/// in pure arrival order), and `reset` abandons the in-flight chain once the
/// current invocation returns — including discarding that invocation's own
/// returned transition.
pub trait StepOps<S>: Send + Sync {
    /// Request a further step. Dropped silently while a reset is pending.
    fn act(&self, step: S, payload: Value);

    /// Request an abort-and-restart at `step`. First pending reset wins.
    fn reset(&self, step: S);
}

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

/// The core handler trait.
///
/// One implementation per non-terminal step; the engine dispatches through
/// this trait object and awaits each invocation to completion before
/// starting the next.
#[async_trait]
pub trait StepHandler<S, St, Cx>: Send + Sync {
    /// Execute the step and decide where the chain goes next.
    async fn run(
        &self,
        view: StepView<S, St, Cx>,
        ops: Arc<dyn StepOps<S>>,
    ) -> Result<Transition<S, St, Cx>, StepError>;
}

// ---------------------------------------------------------------------------
// FnStep
// ---------------------------------------------------------------------------

/// Adapter turning an async closure into a [`StepHandler`].
///
/// Handy for tests and small workflows where a full trait impl per step
/// would be noise.
pub struct FnStep<F>(F);

impl<F> FnStep<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<S, St, Cx, F, Fut> StepHandler<S, St, Cx> for FnStep<F>
where
    S: StepId,
    St: Send + Sync + 'static,
    Cx: Send + Sync + 'static,
    F: Fn(StepView<S, St, Cx>, Arc<dyn StepOps<S>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Transition<S, St, Cx>, StepError>> + Send,
{
    async fn run(
        &self,
        view: StepView<S, St, Cx>,
        ops: Arc<dyn StepOps<S>>,
    ) -> Result<Transition<S, St, Cx>, StepError> {
        (self.0)(view, ops).await
    }
}

// ---------------------------------------------------------------------------
// StepSlot
// ---------------------------------------------------------------------------

/// A handler-table entry: either a handler to invoke or the explicit
/// terminal marker that ends a chain.
pub enum StepSlot<S, St, Cx> {
    /// Invoke this handler when the step is reached.
    Handler(Arc<dyn StepHandler<S, St, Cx>>),
    /// Stop the chain here; invoke nothing, advance nowhere.
    Terminal,
}

impl<S, St, Cx> Clone for StepSlot<S, St, Cx> {
    fn clone(&self) -> Self {
        match self {
            Self::Handler(h) => Self::Handler(Arc::clone(h)),
            Self::Terminal => Self::Terminal,
        }
    }
}

impl<S, St, Cx> StepSlot<S, St, Cx> {
    /// Wrap a handler implementation.
    pub fn handler(h: impl StepHandler<S, St, Cx> + 'static) -> Self {
        Self::Handler(Arc::new(h))
    }

    /// Wrap an async closure via [`FnStep`].
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        S: StepId,
        St: Send + Sync + 'static,
        Cx: Send + Sync + 'static,
        F: Fn(StepView<S, St, Cx>, Arc<dyn StepOps<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Transition<S, St, Cx>, StepError>> + Send + 'static,
    {
        Self::Handler(Arc::new(FnStep::new(f)))
    }

    /// Whether this slot is the terminal marker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}
