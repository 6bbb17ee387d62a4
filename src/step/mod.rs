//! Executing steps.
//!
//! [`Machine::resolve`](crate::core::Machine::resolve) answers "what would
//! this event do" without side effects. The microstep engine applies the
//! answer: it runs actions, starts and stops actors, and stabilizes through
//! eventless transitions and raised events.

mod error;
pub(crate) mod microstep;
mod resolver;

pub use error::{InfiniteMicrostepLoopError, TransitionConflictError};
pub use microstep::DEFAULT_MAX_MICROSTEPS;
pub use resolver::Resolution;
