//! Events and the descriptors transitions match them with.
//!
//! An event is a tagged value: a `type` discriminator plus an arbitrary JSON
//! payload. A handful of type names are reserved for events the runtime
//! synthesizes itself (initialization, completion of states and actors,
//! delayed transitions).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Descriptor that matches every event type.
pub const WILDCARD: &str = "*";

/// Type of the event used to run the initial entry actions.
pub const INIT_EVENT: &str = "statechart.init";

const DONE_STATE_PREFIX: &str = "done.state.";
const DONE_ACTOR_PREFIX: &str = "done.actor.";
const ERROR_ACTOR_PREFIX: &str = "error.actor.";
const AFTER_PREFIX: &str = "after.";

/// An event delivered to an interpreter.
///
/// # Example
///
/// ```rust
/// use harel::core::Event;
/// use serde_json::json;
///
/// let event = Event::with_data("DEPOSIT", json!({ "amount": 25 }));
/// assert_eq!(event.event_type(), "DEPOSIT");
/// assert_eq!(event.get("amount"), Some(&json!(25)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Event {
    /// Create an event without payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Value::Null,
        }
    }

    /// Create an event carrying a payload.
    pub fn with_data(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Look up a top-level payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub(crate) fn init(input: Value) -> Self {
        Self::with_data(INIT_EVENT, input)
    }

    /// Completion event of a compound or parallel state.
    pub fn done_state(state_id: &str, output: Value) -> Self {
        Self::with_data(format!("{DONE_STATE_PREFIX}{state_id}"), output)
    }

    /// Completion event of a child actor.
    pub fn done_actor(actor_id: &str, output: Value) -> Self {
        Self::with_data(format!("{DONE_ACTOR_PREFIX}{actor_id}"), output)
    }

    /// Failure event of a child actor.
    pub fn error_actor(actor_id: &str, message: impl Into<String>) -> Self {
        Self::with_data(
            format!("{ERROR_ACTOR_PREFIX}{actor_id}"),
            Value::String(message.into()),
        )
    }

    /// Event type fired by a delayed transition of `state_id`.
    pub fn after_type(delay: Duration, state_id: &str) -> String {
        format!("{AFTER_PREFIX}{}.{state_id}", delay.as_millis())
    }

    /// Returns true for `error.actor.*` events.
    pub fn is_actor_error(&self) -> bool {
        self.event_type.starts_with(ERROR_ACTOR_PREFIX)
    }
}

impl From<&str> for Event {
    fn from(event_type: &str) -> Self {
        Event::new(event_type)
    }
}

impl From<String> for Event {
    fn from(event_type: String) -> Self {
        Event::new(event_type)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.event_type)
    }
}

/// What a transition listens for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventDescriptor {
    /// A literal event type.
    Exact(String),
    /// `stem.*`: the stem itself or any dotted extension of it.
    Partial(String),
    /// `*`: every event.
    Wildcard,
    /// Eventless transition, checked after every microstep.
    Always,
}

impl EventDescriptor {
    /// Parse the descriptor syntax used by `StateBuilder::on`.
    ///
    /// Returns `None` for the empty string, which names no event.
    pub fn parse(descriptor: &str) -> Option<Self> {
        if descriptor.is_empty() {
            return None;
        }
        if descriptor == WILDCARD {
            return Some(Self::Wildcard);
        }
        match descriptor.strip_suffix(".*") {
            Some(stem) if !stem.is_empty() => Some(Self::Partial(stem.to_string())),
            _ => Some(Self::Exact(descriptor.to_string())),
        }
    }

    /// Check whether an event type is matched by this descriptor.
    ///
    /// `Always` never matches a real event.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == event_type,
            Self::Partial(stem) => {
                event_type == stem
                    || event_type
                        .strip_prefix(stem.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
            Self::Wildcard => true,
            Self::Always => false,
        }
    }

    /// Priority class when several descriptors of one node match.
    /// Lower sorts first.
    pub(crate) fn rank(&self) -> (u8, usize) {
        match self {
            Self::Exact(_) => (0, 0),
            // longer stems are more specific
            Self::Partial(stem) => (1, usize::MAX - stem.len()),
            Self::Wildcard => (2, 0),
            Self::Always => (3, 0),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(event_type) => f.write_str(event_type),
            Self::Partial(stem) => write!(f, "{stem}.*"),
            Self::Wildcard => f.write_str(WILDCARD),
            Self::Always => f.write_str("(always)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_recognizes_descriptor_kinds() {
        assert_eq!(
            EventDescriptor::parse("TIMER"),
            Some(EventDescriptor::Exact("TIMER".to_string()))
        );
        assert_eq!(EventDescriptor::parse("*"), Some(EventDescriptor::Wildcard));
        assert_eq!(
            EventDescriptor::parse("mouse.*"),
            Some(EventDescriptor::Partial("mouse".to_string()))
        );
        assert_eq!(EventDescriptor::parse(""), None);
    }

    #[test]
    fn partial_descriptor_matches_on_token_boundaries() {
        let descriptor = EventDescriptor::parse("mouse.*").unwrap();

        assert!(descriptor.matches("mouse"));
        assert!(descriptor.matches("mouse.click"));
        assert!(descriptor.matches("mouse.click.left"));
        assert!(!descriptor.matches("mousetrap"));
        assert!(!descriptor.matches("keyboard.press"));
    }

    #[test]
    fn always_never_matches_real_events() {
        assert!(!EventDescriptor::Always.matches("anything"));
        assert!(!EventDescriptor::Always.matches(INIT_EVENT));
    }

    #[test]
    fn exact_outranks_partial_outranks_wildcard() {
        let exact = EventDescriptor::Exact("a.b".into()).rank();
        let long = EventDescriptor::Partial("a.b".into()).rank();
        let short = EventDescriptor::Partial("a".into()).rank();
        let wildcard = EventDescriptor::Wildcard.rank();

        assert!(exact < long);
        assert!(long < short);
        assert!(short < wildcard);
    }

    #[test]
    fn event_serializes_with_type_field() {
        let event = Event::with_data("PING", json!({ "n": 1 }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({ "type": "PING", "data": { "n": 1 } }));

        let bare: Event = serde_json::from_value(json!({ "type": "PONG" })).unwrap();
        assert_eq!(bare, Event::new("PONG"));
    }

    #[test]
    fn synthetic_event_names() {
        assert_eq!(Event::done_state("m.a", Value::Null).event_type(), "done.state.m.a");
        assert_eq!(Event::done_actor("fetch", json!(1)).event_type(), "done.actor.fetch");
        assert!(Event::error_actor("fetch", "boom").is_actor_error());
        assert_eq!(
            Event::after_type(Duration::from_millis(1500), "m.wait"),
            "after.1500.m.wait"
        );
    }
}
