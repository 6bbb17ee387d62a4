//! Immutable views of an interpreter.

use super::{InterpreterError, Status};
use crate::checkpoint::Checkpoint;
use crate::core::{Configuration, Event, HistoryRecords, Machine, StateValue};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The externally observable state of an interpreter after a macrostep.
///
/// Snapshots are values: every macrostep produces a new one, so two
/// consecutive snapshots can be compared freely.
#[derive(Clone, Debug)]
pub struct Snapshot<C> {
    pub(crate) machine: Arc<Machine<C>>,
    pub(crate) configuration: Configuration,
    pub(crate) context: C,
    pub(crate) history: HistoryRecords,
    pub(crate) status: Status,
    pub(crate) last_event: Option<Event>,
    pub(crate) output: Option<Value>,
    pub(crate) error: Option<InterpreterError>,
}

impl<C> Snapshot<C> {
    pub fn machine(&self) -> &Arc<Machine<C>> {
        &self.machine
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn history(&self) -> &HistoryRecords {
        &self.history
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The event whose macrostep produced this snapshot.
    pub fn last_event(&self) -> Option<&Event> {
        self.last_event.as_ref()
    }

    /// Output of a machine that reached its top-level final state.
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&InterpreterError> {
        self.error.as_ref()
    }

    /// Qualified ids of the active states in document order.
    pub fn state_ids(&self) -> Vec<String> {
        self.configuration
            .iter()
            .map(|state| self.machine.node(state).id().to_string())
            .collect()
    }

    pub fn value(&self) -> StateValue {
        self.machine.state_value(&self.configuration)
    }

    /// Whether the state value matches a dotted key path such as
    /// `"playback.playing"`.
    pub fn matches(&self, path: &str) -> bool {
        !self.configuration.is_empty() && self.value().matches(path)
    }

    /// Whether the state with the given id (`"#id"` or `"id"`) is active.
    pub fn is_active(&self, id: &str) -> bool {
        self.machine
            .get(id)
            .is_some_and(|state| self.configuration.contains(state))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.configuration
            .iter()
            .any(|state| self.machine.node(state).tags().iter().any(|t| t == tag))
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.machine.tags(&self.configuration)
    }

    /// Whether sending `event` now would take at least one transition.
    ///
    /// Guards are evaluated against the current context; a failing guard
    /// counts as "no".
    pub fn can(&self, event: impl Into<Event>) -> bool {
        if self.status != Status::Running {
            return false;
        }
        self.machine
            .resolve(&self.configuration, &self.history, &self.context, &event.into())
            .is_ok_and(|resolution| !resolution.is_empty())
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }
}

impl<C: Clone> Snapshot<C> {
    /// A serializable restart point for [`Interpreter::restore`](super::Interpreter::restore).
    pub fn checkpoint(&self) -> Checkpoint<C> {
        Checkpoint::capture(
            &self.machine,
            &self.configuration,
            &self.history,
            self.context.clone(),
            self.status,
            self.output.clone(),
        )
    }
}
