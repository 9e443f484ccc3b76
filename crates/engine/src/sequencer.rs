//! The sequencer — runs named async steps to completion, one at a time.
//!
//! [`Sequencer`] is the central orchestrator:
//! 1. `act` places a work item on the [`SequencerQueue`]; if the queue was
//!    idle a drive task is spawned to process it.
//! 2. The drive task runs the item's *chain*: look up the handler for the
//!    active step, await it, commit its returned state/context, advance to
//!    the step it named — until a step maps to [`StepSlot::Terminal`].
//! 3. Handlers may re-enter via the [`StepOps`] capabilities; nested `act`
//!    calls append to the same queue and run strictly in arrival order once
//!    the in-flight chain resolves.
//! 4. `reset` abandons the in-flight chain at its next suspension point and
//!    restarts at the requested step with state/context carried over.
//! 5. A handler failure — a returned error or a panic, which is normalized
//!    into the same error kind at the invocation boundary — is reported to
//!    `on_error` and stalls the sequencer: the failed chain's queue slot is
//!    deliberately never released, so later `act` calls queue behind it
//!    inert until `reset` is called.
//!
//! At most one handler invocation is ever in flight; there is no
//! parallelism, no retry, and no timeout anywhere in this engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use queue::SequencerQueue;
use steps::{StepError, StepId, StepOps, StepSlot, StepView};

use crate::{SequencerError, WorkItem};

// ---------------------------------------------------------------------------
// Handler table
// ---------------------------------------------------------------------------

/// Maps every reachable step identifier to a handler or the terminal marker.
///
/// Totality over the reachable domain is the collaborator's responsibility;
/// a chain that reaches an unmapped step fails with
/// [`SequencerError::UnregisteredStep`].
pub type StepTable<S, St, Cx> = HashMap<S, StepSlot<S, St, Cx>>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Construction-time configuration for a [`Sequencer`].
///
/// The handler table and initial state are required; everything else has a
/// default: context starts at `Cx::default()`, `on_change` is a no-op, and
/// `on_error` logs the failure at `error` level.
pub struct SequencerBuilder<S: std::fmt::Debug, St, Cx> {
    table: StepTable<S, St, Cx>,
    initial_state: St,
    initial_context: Option<Cx>,
    on_change: Option<Box<dyn Fn() + Send + Sync>>,
    on_error: Option<Box<dyn Fn(SequencerError<S>) + Send + Sync>>,
}

impl<S, St, Cx> SequencerBuilder<S, St, Cx>
where
    S: StepId,
    St: Clone + Send + Sync + 'static,
    Cx: Clone + Default + Send + Sync + 'static,
{
    /// Seed the internal context (defaults to `Cx::default()`).
    pub fn initial_context(mut self, context: Cx) -> Self {
        self.initial_context = Some(context);
        self
    }

    /// Invoked once per committed external-state change, with no arguments;
    /// observers re-read via [`Sequencer::state`].
    pub fn on_change(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Box::new(f));
        self
    }

    /// Invoked once per handler-invocation failure with the normalized
    /// [`SequencerError`].
    pub fn on_error(mut self, f: impl Fn(SequencerError<S>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Build the sequencer. Must be called within a tokio runtime — chains
    /// are driven on spawned tasks.
    pub fn build(self) -> Sequencer<S, St, Cx> {
        Sequencer {
            inner: Arc::new(Inner {
                table: self.table,
                on_change: self.on_change.unwrap_or_else(|| Box::new(|| {})),
                on_error: self.on_error.unwrap_or_else(|| {
                    Box::new(|err| error!(error = %err, "unhandled sequencer error"))
                }),
                core: Mutex::new(Core {
                    queue: SequencerQueue::new(),
                    state: self.initial_state,
                    context: self.initial_context.unwrap_or_default(),
                    processing: None,
                    reset_target: None,
                    stalled: false,
                }),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Fields mutated as chains execute. Guarded by one mutex, which is never
/// held across an await point.
struct Core<S, St, Cx> {
    queue: SequencerQueue<WorkItem<S>>,
    state: St,
    context: Cx,
    /// Step of the chain currently in flight; suppresses redundant drives.
    processing: Option<S>,
    /// Pending abort-and-restart target, consumed when its chain starts.
    reset_target: Option<S>,
    /// Set when a failure left the queue's current slot unresolved.
    stalled: bool,
}

struct Inner<S: std::fmt::Debug, St, Cx> {
    table: StepTable<S, St, Cx>,
    on_change: Box<dyn Fn() + Send + Sync>,
    on_error: Box<dyn Fn(SequencerError<S>) + Send + Sync>,
    core: Mutex<Core<S, St, Cx>>,
}

/// How one chain resolved.
enum ChainOutcome<S: std::fmt::Debug> {
    /// Reached a step mapped to the terminal marker.
    Terminal,
    /// Abandoned because a reset target became pending.
    Reset,
    /// A handler invocation failed (or hit an unregistered step).
    Failed(SequencerError<S>),
}

/// The in-process step sequencer.
///
/// Cheap to clone (all clones share one engine). Handlers receive the same
/// engine as an [`StepOps`] trait object, so "external caller" and
/// "mid-handler re-entry" go through the identical `act`/`reset` surface.
pub struct Sequencer<S: std::fmt::Debug, St, Cx> {
    inner: Arc<Inner<S, St, Cx>>,
}

impl<S: std::fmt::Debug, St, Cx> Clone for Sequencer<S, St, Cx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, St, Cx> Sequencer<S, St, Cx>
where
    S: StepId,
    St: Clone + Send + Sync + 'static,
    Cx: Clone + Default + Send + Sync + 'static,
{
    /// Start configuring a sequencer from its two required inputs.
    pub fn builder(table: StepTable<S, St, Cx>, initial_state: St) -> SequencerBuilder<S, St, Cx> {
        SequencerBuilder {
            table,
            initial_state,
            initial_context: None,
            on_change: None,
            on_error: None,
        }
    }
}

impl<S, St, Cx> Sequencer<S, St, Cx>
where
    S: StepId,
    St: Clone + Send + Sync + 'static,
    Cx: Clone + Send + Sync + 'static,
{
    /// Request the named step with no payload.
    ///
    /// Never blocks: the work item is queued and runs now, later, or never
    /// (requests made while a reset is pending are silently dropped).
    pub fn act(&self, step: S) {
        self.act_with(step, Value::Null);
    }

    /// Request the named step with one-shot payload for its first handler
    /// invocation.
    pub fn act_with(&self, step: S, payload: Value) {
        let mut core = self.core();

        if core.reset_target.is_some() {
            debug!(step = ?step, "action dropped: reset pending");
            return;
        }

        let became_active = core.queue.enqueue(WorkItem::new(step, payload));

        // Two-phase start: only an idle->active transition with no chain in
        // flight begins processing. Anything else is drained by the chain
        // that currently owns the queue.
        if became_active && core.processing.is_none() {
            drop(core);
            self.spawn_drive();
        }
    }

    /// Abandon the current chain and restart at `step`.
    ///
    /// First pending reset wins: further `reset` calls are ignored and `act`
    /// calls dropped until the target chain starts. Pending queue items are
    /// discarded immediately; an in-flight handler invocation runs to its
    /// own completion but its result is not committed. State and context
    /// carry over unchanged — reset redirects the step position only.
    pub fn reset(&self, step: S) {
        let mut core = self.core();

        if core.reset_target.is_some() {
            debug!(step = ?step, "reset ignored: another reset is pending");
            return;
        }

        debug!(step = ?step, "reset requested");
        let in_flight = core.processing.take().is_some();
        core.queue.clear();
        core.stalled = false;
        core.reset_target = Some(step.clone());

        // With nothing in flight (idle or stalled) there is no drive task to
        // pick the target up, so enqueue it and start one here.
        if !in_flight {
            core.queue.enqueue(WorkItem::bare(step));
            drop(core);
            self.spawn_drive();
        }
    }

    /// Snapshot of the current external state.
    pub fn state(&self) -> St {
        self.core().state.clone()
    }

    /// Whether a handler failure has left the sequencer stalled.
    ///
    /// A failed chain keeps its queue slot: subsequent `act` calls queue
    /// behind it and never run. This is deliberate fail-closed behaviour;
    /// [`reset`](Self::reset) is the only way back into service.
    pub fn is_stalled(&self) -> bool {
        self.core().stalled
    }

    fn core(&self) -> MutexGuard<'_, Core<S, St, Cx>> {
        self.inner.core.lock().expect("sequencer core poisoned")
    }

    fn spawn_drive(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.drive().await });
    }

    /// Drain the queue: one chain per current item, until the queue is empty
    /// or the engine stalls. Exactly one drive task runs at a time — `act`
    /// spawns one only on an idle->active transition with no chain in
    /// flight, and everything here is decided under the core lock.
    async fn drive(self) {
        loop {
            let (step, payload) = {
                let mut core = self.core();

                let Some(item) = core.queue.current().cloned() else {
                    return;
                };
                if core.processing.is_some() {
                    return;
                }
                // A pending reset only lets its own re-enqueued target
                // through; anything else waits for that item to arrive.
                match &core.reset_target {
                    Some(target) if *target != item.step => return,
                    Some(_) => core.reset_target = None,
                    None => {}
                }

                core.processing = Some(item.step.clone());
                (item.step, item.payload)
            };

            let outcome = self.run_chain(step, payload).await;

            let mut core = self.core();
            core.processing = None;

            // A reset requested at any point during the chain supersedes its
            // outcome entirely: restart at the target with a fresh item.
            if let Some(target) = core.reset_target.clone() {
                core.queue.clear();
                core.queue.enqueue(WorkItem::bare(target));
                continue;
            }

            match outcome {
                ChainOutcome::Terminal => {
                    if core.queue.done() {
                        continue;
                    }
                    return;
                }
                ChainOutcome::Failed(err) => {
                    // The current queue item is intentionally left
                    // unresolved: the workflow is dead until `reset`.
                    core.stalled = true;
                    drop(core);
                    warn!("sequencer stalled after failure; reset is the only recovery path");
                    (self.inner.on_error)(err);
                    return;
                }
                // The pending-reset branch above consumed this case.
                ChainOutcome::Reset => return,
            }
        }
    }

    /// Run one chain from `start` until a terminal step, a failure, or a
    /// reset boundary.
    #[instrument(skip_all, fields(start = ?start))]
    async fn run_chain(&self, start: S, payload: Value) -> ChainOutcome<S> {
        let ops: Arc<dyn StepOps<S>> = Arc::new(self.clone());

        let mut step = start;
        let mut payload = payload;

        loop {
            let handler = match self.inner.table.get(&step) {
                None => return ChainOutcome::Failed(SequencerError::UnregisteredStep(step)),
                Some(StepSlot::Terminal) => {
                    debug!(step = ?step, "chain reached terminal step");
                    return ChainOutcome::Terminal;
                }
                Some(StepSlot::Handler(h)) => Arc::clone(h),
            };

            // Committed snapshot as of the start of this invocation.
            let view = {
                let core = self.core();
                if core.reset_target.is_some() {
                    debug!(step = ?step, "chain abandoned by reset");
                    return ChainOutcome::Reset;
                }
                StepView {
                    state: core.state.clone(),
                    context: core.context.clone(),
                    step: step.clone(),
                    payload,
                }
            };

            debug!(step = ?step, "invoking step handler");
            // The invocation runs on its own task so a panicking handler is
            // normalized into the ordinary failure path instead of killing
            // the drive task with the processing marker still set.
            let invocation = {
                let ops = Arc::clone(&ops);
                tokio::spawn(async move { handler.run(view, ops).await })
            };
            let result = match invocation.await {
                Ok(result) => result,
                Err(join_err) => Err(StepError::Failed(panic_message(join_err))),
            };

            let mut core = self.core();

            // Reset gate: a reset requested during or after the invocation
            // discards its result — success and failure alike — without
            // commit and without an error report.
            if core.reset_target.is_some() {
                debug!(step = ?step, "chain abandoned by reset");
                return ChainOutcome::Reset;
            }

            match result {
                Err(source) => {
                    error!(step = ?step, error = %source, "step handler failed");
                    return ChainOutcome::Failed(SequencerError::StepFailed { step, source });
                }
                Ok(transition) => {
                    if let Some(context) = transition.context {
                        core.context = context;
                    }
                    let state_changed = transition.state.is_some();
                    if let Some(state) = transition.state {
                        core.state = state;
                    }
                    drop(core);

                    // Once per invocation that changed state, outside the
                    // lock so the callback may re-enter act/reset.
                    if state_changed {
                        (self.inner.on_change)();
                    }

                    step = transition.next;
                    // Payload is consumed by the first invocation only.
                    payload = Value::Null;
                }
            }
        }
    }
}

/// Render a joined invocation task's failure as a handler-failure message.
fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic payload".to_owned());
            format!("step handler panicked: {msg}")
        }
        Err(err) => format!("step handler task failed: {err}"),
    }
}

impl<S, St, Cx> StepOps<S> for Sequencer<S, St, Cx>
where
    S: StepId,
    St: Clone + Send + Sync + 'static,
    Cx: Clone + Send + Sync + 'static,
{
    fn act(&self, step: S, payload: Value) {
        self.act_with(step, payload);
    }

    fn reset(&self, step: S) {
        Sequencer::reset(self, step);
    }
}
