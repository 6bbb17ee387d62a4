//! Actor runtime: behaviors, the per-interpreter registry, mailboxes and
//! clocks.
//!
//! An interpreter is itself an actor. The actors it spawns (child machines,
//! promises, callbacks, streams and internal timers) are owned by the state
//! node that started them and live in the interpreter's [`Registry`]. Child
//! actors never hold a reference to their parent; they hold an
//! [`ActorScope`], which is an id plus the parent's mailbox.

mod callback;
mod clock;
mod logic;
mod machine;
mod mailbox;
mod promise;
mod registry;
mod stream;
mod timer;

pub use callback::CallbackArgs;
pub use clock::{Clock, SimulatedClock, TimerHandle, TokioClock};
pub use logic::{ActorLogic, InvokeDef};

pub(crate) use mailbox::{Delivery, Envelope, Inbox, Mailbox, Origin};
pub(crate) use registry::{Registry, SpawnRequest};
pub(crate) use timer::TimerBehavior;

use crate::core::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// The variant of a spawned actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Machine,
    Promise,
    Callback,
    Stream,
    Timer,
    Custom,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Machine => "machine",
            Self::Promise => "promise",
            Self::Callback => "callback",
            Self::Stream => "stream",
            Self::Timer => "timer",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a spawned actor as seen through its [`ActorRef`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorStatus {
    Active,
    Done,
    Error,
    Stopped,
}

/// Failures of actor behaviors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ActorError {
    #[error("No tokio runtime is available to drive the actor")]
    NoRuntime,

    #[error("Actor failed to start: {0}")]
    Start(String),

    #[error("Actor rejected event '{event}': {message}")]
    Receive { event: String, message: String },

    #[error("Actor failed: {0}")]
    Failed(String),
}

/// A process the registry can start, message and stop.
///
/// Behaviors talk back only through the [`ActorScope`] handed to
/// [`Behavior::start`]. `stop` must be idempotent and must not send
/// anything; once it returns, the parent drops whatever the actor still
/// manages to post.
pub trait Behavior: Send {
    fn kind(&self) -> ActorKind;

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError>;

    fn receive(&mut self, event: Event) -> Result<(), ActorError>;

    fn stop(&mut self);

    /// Optional serializable view of the actor's state.
    fn snapshot(&self) -> Option<Value> {
        None
    }

    /// Drain work queued in a linked mailbox.
    fn wake(&mut self) -> Result<(), ActorError> {
        Ok(())
    }
}

/// What a running actor knows about its place in the tree.
#[derive(Clone)]
pub struct ActorScope {
    origin: Origin,
    parent: Mailbox,
    clock: Arc<dyn Clock>,
    input: Value,
}

impl ActorScope {
    pub(crate) fn new(origin: Origin, parent: Mailbox, clock: Arc<dyn Clock>, input: Value) -> Self {
        Self {
            origin,
            parent,
            clock,
            input,
        }
    }

    pub fn id(&self) -> &str {
        &self.origin.id
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Send an event to the parent. Returns false once the parent is gone.
    pub fn send(&self, event: impl Into<Event>) -> bool {
        self.post(event.into(), false)
    }

    /// Report successful completion: the parent receives
    /// `done.actor.<id>` carrying `output`.
    pub fn complete(&self, output: Value) -> bool {
        self.post(Event::done_actor(self.id(), output), true)
    }

    /// Report failure: the parent receives `error.actor.<id>`.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.post(Event::error_actor(self.id(), message), true)
    }

    pub(crate) fn fire(&self, delivery: Delivery) -> bool {
        self.parent.post(Envelope::TimerFired {
            origin: self.origin.clone(),
            delivery,
        })
    }

    pub(crate) fn parent(&self) -> &Mailbox {
        &self.parent
    }

    fn post(&self, event: Event, terminal: bool) -> bool {
        self.parent.post(Envelope::Event {
            origin: Some(self.origin.clone()),
            event,
            terminal,
        })
    }
}

impl fmt::Debug for ActorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorScope")
            .field("id", &self.origin.id)
            .field("input", &self.input)
            .finish()
    }
}

/// Handle to a spawned actor.
///
/// Sending goes through the parent's mailbox, so events reach the child in
/// the parent's run-to-completion order and are dropped if the child has
/// been stopped in the meantime.
#[derive(Clone, Debug)]
pub struct ActorRef {
    id: String,
    kind: ActorKind,
    status: watch::Receiver<ActorStatus>,
    parent: Mailbox,
}

impl ActorRef {
    pub(crate) fn new(
        id: String,
        kind: ActorKind,
        status: watch::Receiver<ActorStatus>,
        parent: Mailbox,
    ) -> Self {
        Self {
            id,
            kind,
            status,
            parent,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn status(&self) -> ActorStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<ActorStatus> {
        self.status.clone()
    }

    pub fn send(&self, event: impl Into<Event>) -> bool {
        self.parent.post(Envelope::Forward {
            to: self.id.clone(),
            event: event.into(),
        })
    }
}
