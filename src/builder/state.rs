//! Builder for state nodes.

use super::{InvokeBuilder, TransitionBuilder};
use crate::core::{Event, HistoryKind, OutputFn};
use crate::effects::Action;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KindSpec {
    /// Atomic without children, compound with them.
    Auto,
    Parallel,
    Final,
    History(HistoryKind),
}

/// What a transition listens for before ids are known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    Event(String),
    Always,
    /// `done.state.<this state>`
    Done,
}

/// Fluent description of one state and its subtree.
pub struct StateBuilder<C> {
    pub(crate) key: String,
    pub(crate) id: Option<String>,
    pub(crate) kind: KindSpec,
    pub(crate) initial: Option<String>,
    pub(crate) history_target: Option<String>,
    pub(crate) children: Vec<StateBuilder<C>>,
    pub(crate) transitions: Vec<(Trigger, TransitionBuilder<C>)>,
    pub(crate) after: Vec<(Duration, TransitionBuilder<C>)>,
    pub(crate) entry: Vec<Action<C>>,
    pub(crate) exit: Vec<Action<C>>,
    pub(crate) invokes: Vec<InvokeBuilder<C>>,
    pub(crate) output: Option<OutputFn<C>>,
    pub(crate) tags: Vec<String>,
    pub(crate) description: Option<String>,
}

impl<C> StateBuilder<C> {
    /// An atomic state, or a compound one once children are added.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: None,
            kind: KindSpec::Auto,
            initial: None,
            history_target: None,
            children: Vec::new(),
            transitions: Vec::new(),
            after: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            invokes: Vec::new(),
            output: None,
            tags: Vec::new(),
            description: None,
        }
    }

    /// A history pseudo-state. Targeting it re-enters whatever its parent
    /// had active when last exited.
    pub fn history(key: impl Into<String>, kind: HistoryKind) -> Self {
        let mut state = Self::new(key);
        state.kind = KindSpec::History(kind);
        state
    }

    /// Make every child an orthogonal region.
    pub fn parallel(mut self) -> Self {
        self.kind = KindSpec::Parallel;
        self
    }

    /// Entering this state completes its parent.
    pub fn final_state(mut self) -> Self {
        self.kind = KindSpec::Final;
        self
    }

    /// Replace the derived id (`<parent id>.<key>`).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Initial child key; defaults to the first child.
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    /// Where a history state goes before anything was recorded. Resolved
    /// like a transition target from the history state.
    pub fn default_target(mut self, target: impl Into<String>) -> Self {
        self.history_target = Some(target.into());
        self
    }

    pub fn state(mut self, child: StateBuilder<C>) -> Self {
        self.children.push(child);
        self
    }

    pub fn states(mut self, children: impl IntoIterator<Item = StateBuilder<C>>) -> Self {
        self.children.extend(children);
        self
    }

    /// Add a transition for an event descriptor: an event type, `"stem.*"`
    /// or `"*"`. Calling it again with the same descriptor adds another
    /// candidate, tried in order.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.transitions
            .push((Trigger::Event(event.into()), transition.into()));
        self
    }

    /// Eventless transition, checked after every microstep.
    pub fn always(mut self, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.transitions.push((Trigger::Always, transition.into()));
        self
    }

    /// Transition taken when a final child (or every region) completes.
    pub fn on_done(mut self, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.transitions.push((Trigger::Done, transition.into()));
        self
    }

    /// Transition taken `delay` after entering, unless the state is left
    /// first.
    pub fn after(mut self, delay: Duration, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.after.push((delay, transition.into()));
        self
    }

    pub fn entry(mut self, action: Action<C>) -> Self {
        self.entry.push(action);
        self
    }

    pub fn exit(mut self, action: Action<C>) -> Self {
        self.exit.push(action);
        self
    }

    pub fn invoke(mut self, invoke: InvokeBuilder<C>) -> Self {
        self.invokes.push(invoke);
        self
    }

    /// Data carried by the done event this final state raises.
    pub fn output<F>(mut self, output: F) -> Self
    where
        F: Fn(&C, &Event) -> Value + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(output));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
