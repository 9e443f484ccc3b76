//! `queue` crate — the single-consumer sequencer queue.
//!
//! [`SequencerQueue`] serializes externally arriving work items into strict
//! arrival order and exposes exactly one "current" item to its owner at a
//! time. The owner advances it explicitly:
//!
//! 1. `enqueue` appends; if the queue was idle the item is promoted to
//!    current and `enqueue` returns `true` — the owner decides synchronously
//!    whether to start processing.
//! 2. `done` releases the current item and promotes the next pending one,
//!    returning `true` while there is more to drain.
//! 3. `clear` wipes everything; afterwards the queue is observably identical
//!    to one that was never populated.
//!
//! No retries, no priorities, no deduplication — FIFO is the only ordering
//! discipline. The queue knows nothing about what its items mean.

use std::collections::VecDeque;

use tracing::trace;

/// FIFO of pending work items with a one-slot "current" marker.
#[derive(Debug)]
pub struct SequencerQueue<T> {
    current: Option<T>,
    pending: VecDeque<T>,
}

impl<T> Default for SequencerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SequencerQueue<T> {
    /// Create an empty, idle queue.
    pub fn new() -> Self {
        Self {
            current: None,
            pending: VecDeque::new(),
        }
    }

    /// Append an item.
    ///
    /// Returns `true` iff the queue transitioned from idle to active, i.e.
    /// the item was promoted straight to current. A `false` return means the
    /// item queued behind an existing current item.
    pub fn enqueue(&mut self, item: T) -> bool {
        self.pending.push_back(item);
        if self.current.is_some() {
            return false;
        }
        self.current = self.pending.pop_front();
        trace!("queue transitioned idle -> active");
        true
    }

    /// The item currently being processed, if any.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Whether the queue has neither a current item nor pending ones.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Release the current item and promote the next pending one.
    ///
    /// This is the only way the queue advances past an item; the owner must
    /// call it exactly once per item it has finished processing. Returns
    /// `true` iff a new current item was promoted.
    pub fn done(&mut self) -> bool {
        self.current = self.pending.pop_front();
        self.current.is_some()
    }

    /// Discard the current marker and all pending items unconditionally.
    pub fn clear(&mut self) {
        trace!(dropped = self.pending.len(), "queue cleared");
        self.current = None;
        self.pending.clear();
    }
}
