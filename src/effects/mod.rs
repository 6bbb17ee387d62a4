//! Effects attached to a machine definition.
//!
//! The pure core decides *which* transitions fire; this module holds *what*
//! they do: actions, transition clauses, and the errors user code can raise
//! while they run. Execution itself lives in [`step`](crate::step).

mod action;
mod error;
mod transition;

pub use action::{Action, ActionScope, SendTarget};
pub use error::{ActionError, GuardError};
pub use transition::{Candidate, TransitionDef, TransitionRef};

pub(crate) use action::{InputFn, ScopeCommand};
