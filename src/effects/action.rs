//! The closed set of actions a machine can execute.
//!
//! Actions are data: they describe an effect and are carried out by the
//! microstep engine in a fixed order (exit actions, transition actions,
//! entry actions). `assign` replaces the context immediately, so later
//! actions of the same list observe the new value. Everything that talks to
//! the outside world (sending, spawning, delays) goes through the owning
//! interpreter's mailbox and never runs inline.

use crate::actor::ActorLogic;
use crate::core::Event;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type AssignFn<C> = Arc<dyn Fn(&C, &Event) -> Result<C, String> + Send + Sync>;
pub(crate) type EventFn<C> = Arc<dyn Fn(&C, &Event) -> Event + Send + Sync>;
pub(crate) type MessageFn<C> = Arc<dyn Fn(&C, &Event) -> String + Send + Sync>;
pub(crate) type InputFn<C> = Arc<dyn Fn(&C, &Event) -> Value + Send + Sync>;
pub(crate) type EffectFn<C> =
    Arc<dyn Fn(&C, &Event, &mut ActionScope) -> Result<(), String> + Send + Sync>;

/// Recipient of a `send` action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendTarget {
    /// The interpreter's own mailbox, behind any queued events.
    Myself,
    /// The parent actor, when the machine runs as a child.
    Parent,
    /// A child actor by id.
    Child(String),
}

/// An executable action.
///
/// # Example
///
/// ```rust
/// use harel::effects::Action;
/// use std::time::Duration;
///
/// #[derive(Clone, Debug)]
/// struct Counter {
///     count: u32,
/// }
///
/// let increment = Action::assign(|c: &Counter, _| Counter { count: c.count + 1 }).named("increment");
/// let remind = Action::<Counter>::send_self("REMIND")
///     .delay(Duration::from_secs(30))
///     .with_id("reminder");
///
/// assert_eq!(increment.label(), "increment");
/// assert_eq!(remind.label(), "send(self)");
/// ```
pub enum Action<C> {
    Assign {
        name: String,
        assign: AssignFn<C>,
    },
    Raise {
        event: EventFn<C>,
        delay: Option<Duration>,
        id: Option<String>,
    },
    Send {
        target: SendTarget,
        event: EventFn<C>,
        delay: Option<Duration>,
        id: Option<String>,
    },
    /// Cancel a pending delayed raise or send by id.
    Cancel(String),
    Log {
        label: Option<String>,
        message: MessageFn<C>,
    },
    Spawn {
        id: Option<String>,
        logic: ActorLogic,
        input: Option<InputFn<C>>,
    },
    StopChild(String),
    Effect {
        name: String,
        effect: EffectFn<C>,
    },
}

impl<C> Action<C> {
    /// Replace the context with a value computed from the old one.
    pub fn assign<F>(assign: F) -> Self
    where
        F: Fn(&C, &Event) -> C + Send + Sync + 'static,
    {
        Self::try_assign(move |context, event| Ok(assign(context, event)))
    }

    /// Like [`Action::assign`], but the update may fail.
    pub fn try_assign<F>(assign: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<C, String> + Send + Sync + 'static,
    {
        Action::Assign {
            name: "assign".to_string(),
            assign: Arc::new(assign),
        }
    }

    /// Put an event on the internal queue; it is processed in the current
    /// macrostep.
    pub fn raise(event: impl Into<Event>) -> Self {
        let event = event.into();
        Self::raise_with(move |_, _| event.clone())
    }

    pub fn raise_with<F>(event: F) -> Self
    where
        F: Fn(&C, &Event) -> Event + Send + Sync + 'static,
    {
        Action::Raise {
            event: Arc::new(event),
            delay: None,
            id: None,
        }
    }

    pub fn send_self(event: impl Into<Event>) -> Self {
        Self::send(SendTarget::Myself, event.into())
    }

    pub fn send_parent(event: impl Into<Event>) -> Self {
        Self::send(SendTarget::Parent, event.into())
    }

    pub fn send_parent_with<F>(event: F) -> Self
    where
        F: Fn(&C, &Event) -> Event + Send + Sync + 'static,
    {
        Self::send_with(SendTarget::Parent, event)
    }

    pub fn send_to(child: impl Into<String>, event: impl Into<Event>) -> Self {
        Self::send(SendTarget::Child(child.into()), event.into())
    }

    pub fn send_to_with<F>(child: impl Into<String>, event: F) -> Self
    where
        F: Fn(&C, &Event) -> Event + Send + Sync + 'static,
    {
        Self::send_with(SendTarget::Child(child.into()), event)
    }

    fn send(target: SendTarget, event: Event) -> Self {
        Self::send_with(target, move |_, _| event.clone())
    }

    fn send_with<F>(target: SendTarget, event: F) -> Self
    where
        F: Fn(&C, &Event) -> Event + Send + Sync + 'static,
    {
        Action::Send {
            target,
            event: Arc::new(event),
            delay: None,
            id: None,
        }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Action::Cancel(id.into())
    }

    /// Emit a fixed message through `tracing`.
    pub fn log(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::log_with(move |_, _| message.clone())
    }

    pub fn log_with<F>(message: F) -> Self
    where
        F: Fn(&C, &Event) -> String + Send + Sync + 'static,
    {
        Action::Log {
            label: None,
            message: Arc::new(message),
        }
    }

    /// Start a child actor owned by the state that runs this action.
    pub fn spawn(logic: ActorLogic) -> Self {
        Action::Spawn {
            id: None,
            logic,
            input: None,
        }
    }

    pub fn stop_child(id: impl Into<String>) -> Self {
        Action::StopChild(id.into())
    }

    /// Arbitrary side effect with access to an [`ActionScope`].
    pub fn effect<F>(effect: F) -> Self
    where
        F: Fn(&C, &Event, &mut ActionScope) -> Result<(), String> + Send + Sync + 'static,
    {
        Action::Effect {
            name: "effect".to_string(),
            effect: Arc::new(effect),
        }
    }

    /// Name an assign or effect action, or label a log action.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        match &mut self {
            Action::Assign { name, .. } | Action::Effect { name, .. } => *name = label.into(),
            Action::Log { label: slot, .. } => *slot = Some(label.into()),
            _ => {}
        }
        self
    }

    /// Deliver a raise or send after `delay` instead of immediately.
    pub fn delay(mut self, after: Duration) -> Self {
        if let Action::Raise { delay, .. } | Action::Send { delay, .. } = &mut self {
            *delay = Some(after);
        }
        self
    }

    /// Id of a delayed event (for [`Action::cancel`]) or of a spawned actor.
    pub fn with_id(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Action::Raise { id, .. } | Action::Send { id, .. } | Action::Spawn { id, .. } => {
                *id = Some(value.into())
            }
            _ => {}
        }
        self
    }

    /// Input handed to a spawned actor, computed from context and event.
    pub fn input<F>(mut self, input: F) -> Self
    where
        F: Fn(&C, &Event) -> Value + Send + Sync + 'static,
    {
        if let Action::Spawn { input: slot, .. } = &mut self {
            *slot = Some(Arc::new(input));
        }
        self
    }

    /// Human-readable label used in logs and errors.
    pub fn label(&self) -> String {
        match self {
            Action::Assign { name, .. } | Action::Effect { name, .. } => name.clone(),
            Action::Raise { .. } => "raise".to_string(),
            Action::Send { target, .. } => match target {
                SendTarget::Myself => "send(self)".to_string(),
                SendTarget::Parent => "send(parent)".to_string(),
                SendTarget::Child(id) => format!("send({id})"),
            },
            Action::Cancel(id) => format!("cancel({id})"),
            Action::Log { label, .. } => match label {
                Some(label) => format!("log({label})"),
                None => "log".to_string(),
            },
            Action::Spawn { id, logic, .. } => match id {
                Some(id) => format!("spawn({id})"),
                None => format!("spawn({})", logic.kind()),
            },
            Action::StopChild(id) => format!("stop({id})"),
        }
    }
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        match self {
            Action::Assign { name, assign } => Action::Assign {
                name: name.clone(),
                assign: Arc::clone(assign),
            },
            Action::Raise { event, delay, id } => Action::Raise {
                event: Arc::clone(event),
                delay: *delay,
                id: id.clone(),
            },
            Action::Send {
                target,
                event,
                delay,
                id,
            } => Action::Send {
                target: target.clone(),
                event: Arc::clone(event),
                delay: *delay,
                id: id.clone(),
            },
            Action::Cancel(id) => Action::Cancel(id.clone()),
            Action::Log { label, message } => Action::Log {
                label: label.clone(),
                message: Arc::clone(message),
            },
            Action::Spawn { id, logic, input } => Action::Spawn {
                id: id.clone(),
                logic: logic.clone(),
                input: input.clone(),
            },
            Action::StopChild(id) => Action::StopChild(id.clone()),
            Action::Effect { name, effect } => Action::Effect {
                name: name.clone(),
                effect: Arc::clone(effect),
            },
        }
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.label()).finish()
    }
}

/// Commands a custom effect may issue.
///
/// They are applied in order right after the effect returns, with the same
/// semantics as the corresponding actions.
#[derive(Debug, Default)]
pub struct ActionScope {
    commands: Vec<ScopeCommand>,
}

#[derive(Debug)]
pub(crate) enum ScopeCommand {
    Raise(Event),
    Send(SendTarget, Event),
}

impl ActionScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, event: impl Into<Event>) {
        self.commands.push(ScopeCommand::Raise(event.into()));
    }

    pub fn send_self(&mut self, event: impl Into<Event>) {
        self.commands
            .push(ScopeCommand::Send(SendTarget::Myself, event.into()));
    }

    pub fn send_parent(&mut self, event: impl Into<Event>) {
        self.commands
            .push(ScopeCommand::Send(SendTarget::Parent, event.into()));
    }

    pub fn send_to(&mut self, child: impl Into<String>, event: impl Into<Event>) {
        self.commands
            .push(ScopeCommand::Send(SendTarget::Child(child.into()), event.into()));
    }

    pub(crate) fn into_commands(self) -> Vec<ScopeCommand> {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Count(u32);

    #[test]
    fn assign_computes_new_context() {
        let action = Action::assign(|c: &Count, _| Count(c.0 + 2));
        let Action::Assign { assign, .. } = action else {
            panic!("expected assign");
        };

        assert_eq!(assign(&Count(1), &Event::new("INC")), Ok(Count(3)));
    }

    #[test]
    fn modifiers_only_touch_applicable_variants() {
        let delayed = Action::<Count>::raise("PING")
            .delay(Duration::from_millis(50))
            .with_id("ping");
        let Action::Raise { delay, id, .. } = &delayed else {
            panic!("expected raise");
        };
        assert_eq!(*delay, Some(Duration::from_millis(50)));
        assert_eq!(id.as_deref(), Some("ping"));

        let cancel = Action::<Count>::cancel("ping").delay(Duration::from_secs(1));
        assert!(matches!(cancel, Action::Cancel(ref id) if id == "ping"));
    }

    #[test]
    fn labels_describe_actions() {
        assert_eq!(Action::<Count>::send_to("worker", "GO").label(), "send(worker)");
        assert_eq!(Action::<Count>::log("hello").named("greeting").label(), "log(greeting)");
        assert_eq!(Action::<Count>::stop_child("worker").label(), "stop(worker)");
        assert_eq!(
            Action::effect(|_: &Count, _, _| Ok(())).named("notify").label(),
            "notify"
        );
    }

    #[test]
    fn scope_collects_commands_in_order() {
        let mut scope = ActionScope::new();
        scope.raise("A");
        scope.send_to("child", "B");
        scope.send_parent("C");

        let commands = scope.into_commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(&commands[0], ScopeCommand::Raise(e) if e.event_type() == "A"));
        assert!(matches!(
            &commands[1],
            ScopeCommand::Send(SendTarget::Child(id), e) if id == "child" && e.event_type() == "B"
        ));
    }
}
