//! Errors raised while computing and applying steps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two selected transitions would exit overlapping sets of states.
///
/// The earlier transition (in the order regions appear in the document) is
/// kept and the later one discarded. This is reported, never raised.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Transition from '{discarded}' on '{event}' conflicts with the transition from '{kept}' and was discarded")]
pub struct TransitionConflictError {
    pub event: String,
    pub kept: String,
    pub discarded: String,
}

/// Eventless transitions or raised events kept the machine busy past the
/// configured microstep cap.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Exceeded {limit} microsteps while processing event '{event}'")]
pub struct InfiniteMicrostepLoopError {
    pub limit: usize,
    pub event: String,
}
