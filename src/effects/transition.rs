//! Transition definitions as stored in the machine.

use super::action::Action;
use crate::core::{EventDescriptor, Guard, StateId};
use std::fmt;

/// All candidates of one state node for one event descriptor.
///
/// Candidates are evaluated in declaration order; the first whose guard
/// passes (or that has no guard) is selected.
pub struct TransitionDef<C> {
    pub(crate) source: StateId,
    pub(crate) descriptor: EventDescriptor,
    pub(crate) candidates: Vec<Candidate<C>>,
}

/// One `{guard?, targets?, actions?}` clause.
pub struct Candidate<C> {
    pub(crate) guard: Option<Guard<C>>,
    pub(crate) targets: Vec<StateId>,
    pub(crate) actions: Vec<Action<C>>,
    pub(crate) reenter: bool,
}

impl<C> TransitionDef<C> {
    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn descriptor(&self) -> &EventDescriptor {
        &self.descriptor
    }

    pub fn candidates(&self) -> &[Candidate<C>] {
        &self.candidates
    }
}

impl<C> Candidate<C> {
    pub fn guard(&self) -> Option<&Guard<C>> {
        self.guard.as_ref()
    }

    /// Resolved targets; empty for a targetless transition.
    pub fn targets(&self) -> &[StateId] {
        &self.targets
    }

    pub fn actions(&self) -> &[Action<C>] {
        &self.actions
    }

    /// Whether a transition to the source or its descendants exits and
    /// re-enters the source.
    pub fn reenter(&self) -> bool {
        self.reenter
    }

    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Address of a selected candidate inside the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionRef {
    pub source: StateId,
    pub transition: usize,
    pub candidate: usize,
}

impl<C> fmt::Debug for TransitionDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionDef")
            .field("source", &self.source)
            .field("descriptor", &self.descriptor)
            .field("candidates", &self.candidates)
            .finish()
    }
}

impl<C> fmt::Debug for Candidate<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("guard", &self.guard)
            .field("targets", &self.targets)
            .field("actions", &self.actions.len())
            .field("reenter", &self.reenter)
            .finish()
    }
}
