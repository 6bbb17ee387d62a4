//! Failures raised by user-supplied guards and actions.

use thiserror::Error;

/// A guard predicate returned an error instead of a verdict.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Guard '{guard}' failed on event '{event}': {message}")]
pub struct GuardError {
    pub guard: String,
    pub event: String,
    pub message: String,
}

/// An assign or custom action returned an error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Action '{action}' failed: {message}")]
pub struct ActionError {
    pub action: String,
    pub message: String,
}
