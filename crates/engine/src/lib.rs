//! `engine` crate — the execution engine behind the step sequencer.
//!
//! Owns the queue, the handler table, and the external-state / internal-
//! context pair; drives each queued item's handler chain to a terminal
//! step, implements abort-and-restart (`reset`), and isolates handler
//! failures behind the `on_error` callback.

pub mod error;
pub mod models;
pub mod sequencer;

pub use error::SequencerError;
pub use models::WorkItem;
pub use sequencer::{Sequencer, SequencerBuilder, StepTable};
