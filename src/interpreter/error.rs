//! Interpreter failures.

use crate::effects::{ActionError, GuardError};
use crate::step::InfiniteMicrostepLoopError;
use thiserror::Error;

/// A macrostep failed. The interpreter that raised it is unusable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    InfiniteLoop(#[from] InfiniteMicrostepLoopError),
}

/// Errors returned by awaiting an [`InterpreterTask`](super::InterpreterTask).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
