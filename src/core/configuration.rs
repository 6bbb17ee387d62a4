//! The set of active state nodes.

use super::state::StateId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Active state nodes, leaves and all of their ancestors.
///
/// Iteration order is document order, which is also entry order; reverse
/// iteration gives exit order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    states: BTreeSet<StateId>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, state: StateId) -> bool {
        self.states.contains(&state)
    }

    pub(crate) fn insert(&mut self, state: StateId) -> bool {
        self.states.insert(state)
    }

    pub(crate) fn remove(&mut self, state: StateId) -> bool {
        self.states.remove(&state)
    }

    /// States in document order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = StateId> + '_ {
        self.states.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl FromIterator<StateId> for Configuration {
    fn from_iter<T: IntoIterator<Item = StateId>>(iter: T) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}
