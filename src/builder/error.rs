//! Definition errors for machine builders.

use std::fmt;
use thiserror::Error;

/// A problem with a machine definition, found at build time.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Context not specified. Call .context(value) or .context_from(factory) before .build()")]
    MissingContext,

    #[error("Invalid state key '{key}' under '{parent}': keys must be non-empty and contain no '.' or '#'")]
    InvalidKey { parent: String, key: String },

    #[error("Duplicate state id '{0}'")]
    DuplicateId(String),

    #[error("State '{parent}' has more than one child named '{key}'")]
    DuplicateKey { parent: String, key: String },

    #[error("State '{state}' has no child '{initial}' to start in")]
    InvalidInitial { state: String, initial: String },

    #[error("Compound state '{0}' has no child it can start in")]
    MissingInitial(String),

    #[error("Parallel state '{0}' has no regions")]
    EmptyParallel(String),

    #[error("{kind} state '{state}' cannot have children")]
    UnexpectedChildren { state: String, kind: &'static str },

    #[error("Final state '{0}' cannot have outgoing transitions")]
    FinalWithTransitions(String),

    #[error("Invalid event descriptor '{descriptor}' on state '{state}'")]
    InvalidDescriptor { state: String, descriptor: String },

    #[error("Transition from '{from}' targets unknown state '{target}'")]
    UnknownTarget { from: String, target: String },

    #[error("Transition from '{from}' targets '{}' and '{}', which cannot be active together", targets.0, targets.1)]
    ConflictingTargets {
        from: String,
        targets: (String, String),
    },

    #[error("Default target '{target}' of history state '{state}' is not inside its parent")]
    InvalidHistoryDefault { state: String, target: String },

    #[error("Guard on a transition from '{state}' refers to unknown state '{reference}'")]
    UnknownGuardState { state: String, reference: String },

    #[error("Duplicate invoke id '{0}'")]
    DuplicateInvokeId(String),
}

/// Every problem found in one build.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct DefinitionErrors(pub(crate) Vec<DefinitionError>);

impl DefinitionErrors {
    pub fn errors(&self) -> &[DefinitionError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, error: &DefinitionError) -> bool {
        self.0.contains(error)
    }

    pub fn into_inner(self) -> Vec<DefinitionError> {
        self.0
    }
}

impl fmt::Display for DefinitionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid machine definition ({} errors)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DefinitionErrors {
    type Item = &'a DefinitionError;
    type IntoIter = std::slice::Iter<'a, DefinitionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
