//! `steps` crate — the `StepHandler` trait and the invocation vocabulary.
//!
//! Every step handler implements [`StepHandler`]; the engine crate
//! dispatches execution through this trait object, handing each invocation a
//! read-only [`StepView`] snapshot plus the explicit [`StepOps`]
//! capabilities for re-entering the sequencer.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::StepError;
pub use traits::{FnStep, StepHandler, StepId, StepOps, StepSlot, StepView, Transition};
