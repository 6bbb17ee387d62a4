//! Builder for transition candidates.

use crate::core::{Event, Guard};
use crate::effects::Action;

/// One candidate clause: optional guard, zero or more targets, actions.
///
/// Strings convert into an unguarded transition to that target, so
/// `.on("TIMER", "green")` and `.on("TIMER", TransitionBuilder::to("green"))`
/// mean the same thing.
///
/// Target syntax, resolved when the machine is built:
/// - `"sibling"` or `"sibling.child"`: relative to the source's parent
/// - `".child"`: relative to the source itself
/// - `"#id"` or `"#id.child"`: by state id
pub struct TransitionBuilder<C> {
    pub(crate) targets: Vec<String>,
    pub(crate) guard: Option<Guard<C>>,
    pub(crate) actions: Vec<Action<C>>,
    pub(crate) reenter: bool,
}

impl<C> TransitionBuilder<C> {
    /// A transition to one target.
    pub fn to(target: impl Into<String>) -> Self {
        Self::targets([target])
    }

    /// A transition to several targets, one per parallel region.
    pub fn targets<T: Into<String>>(targets: impl IntoIterator<Item = T>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            guard: None,
            actions: Vec::new(),
            reenter: false,
        }
    }

    /// A transition that runs actions without leaving any state.
    pub fn targetless() -> Self {
        Self::targets(Vec::<String>::new())
    }

    pub fn guard(mut self, guard: Guard<C>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.guard(Guard::new(predicate))
    }

    pub fn action(mut self, action: Action<C>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action<C>>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Exit and re-enter the source even when every target lies inside it.
    pub fn reenter(mut self) -> Self {
        self.reenter = true;
        self
    }
}

impl<C> From<&str> for TransitionBuilder<C> {
    fn from(target: &str) -> Self {
        Self::to(target)
    }
}

impl<C> From<String> for TransitionBuilder<C> {
    fn from(target: String) -> Self {
        Self::to(target)
    }
}
