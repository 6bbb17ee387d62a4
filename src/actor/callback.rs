//! Callback actors: an imperative process wired up once on start.

use super::{ActorError, ActorKind, ActorScope, Behavior};
use crate::core::Event;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub(crate) type CallbackFn = Arc<dyn Fn(&mut CallbackArgs) -> Result<(), String> + Send + Sync>;

type Receiver = Box<dyn FnMut(Event) + Send>;
type Cleanup = Box<dyn FnOnce() + Send>;

/// Handed to a callback actor's setup function.
///
/// The setup function may keep a [`sender`](Self::sender) to send events
/// back to the parent at any time, register a handler for events sent to
/// the actor, and register cleanup that runs when the actor is stopped.
///
/// # Example
///
/// ```rust
/// use harel::actor::ActorLogic;
/// use harel::core::Event;
///
/// let echo = ActorLogic::callback(|args| {
///     let parent = args.sender();
///     args.on_receive(move |event: Event| {
///         parent.send(Event::new(format!("echo.{}", event.event_type())));
///     });
///     args.on_cleanup(|| tracing::debug!("echo stopped"));
///     Ok(())
/// });
/// ```
pub struct CallbackArgs {
    scope: ActorScope,
    receiver: Option<Receiver>,
    cleanup: Option<Cleanup>,
}

impl CallbackArgs {
    pub fn input(&self) -> &Value {
        self.scope.input()
    }

    /// A cloneable handle for talking back to the parent.
    pub fn sender(&self) -> ActorScope {
        self.scope.clone()
    }

    pub fn send_back(&self, event: impl Into<Event>) -> bool {
        self.scope.send(event)
    }

    pub fn on_receive(&mut self, receiver: impl FnMut(Event) + Send + 'static) {
        self.receiver = Some(Box::new(receiver));
    }

    pub fn on_cleanup(&mut self, cleanup: impl FnOnce() + Send + 'static) {
        self.cleanup = Some(Box::new(cleanup));
    }
}

impl fmt::Debug for CallbackArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackArgs")
            .field("scope", &self.scope)
            .field("receives", &self.receiver.is_some())
            .finish()
    }
}

pub(crate) struct CallbackBehavior {
    setup: CallbackFn,
    receiver: Option<Receiver>,
    cleanup: Option<Cleanup>,
}

impl CallbackBehavior {
    pub fn new(setup: CallbackFn) -> Self {
        Self {
            setup,
            receiver: None,
            cleanup: None,
        }
    }
}

impl Behavior for CallbackBehavior {
    fn kind(&self) -> ActorKind {
        ActorKind::Callback
    }

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError> {
        let mut args = CallbackArgs {
            scope,
            receiver: None,
            cleanup: None,
        };
        let result = (self.setup)(&mut args);
        self.receiver = args.receiver;
        self.cleanup = args.cleanup;
        result.map_err(ActorError::Start)
    }

    fn receive(&mut self, event: Event) -> Result<(), ActorError> {
        if let Some(receiver) = self.receiver.as_mut() {
            receiver(event);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.receiver = None;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorLogic, Clock, Envelope, Mailbox, Origin, SimulatedClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scope() -> (ActorScope, crate::actor::Inbox) {
        let (mailbox, inbox) = Mailbox::channel();
        let origin = Origin {
            id: "ticker".to_string(),
            seq: 0,
        };
        let clock: Arc<dyn Clock> = Arc::new(SimulatedClock::new());
        (ActorScope::new(origin, mailbox, clock, Value::Null), inbox)
    }

    #[test]
    fn receive_handler_can_send_back() {
        let logic = ActorLogic::callback(|args| {
            let parent = args.sender();
            args.on_receive(move |event| {
                parent.send(format!("ack.{}", event.event_type()));
            });
            Ok(())
        });
        let (scope, mut inbox) = scope();
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();
        behavior.receive(Event::new("PING")).unwrap();

        match inbox.try_recv() {
            Ok(Envelope::Event { event, terminal, .. }) => {
                assert!(!terminal);
                assert_eq!(event.event_type(), "ack.PING");
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn cleanup_runs_once_on_stop() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleaned);
        let logic = ActorLogic::callback(move |args| {
            let counter = Arc::clone(&counter);
            args.on_cleanup(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        });
        let (scope, _inbox) = scope();
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();
        behavior.stop();
        behavior.stop();

        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn setup_error_is_a_start_failure() {
        let logic = ActorLogic::callback(|_| Err("no device".to_string()));
        let (scope, _inbox) = scope();

        assert_eq!(
            logic.create().start(scope),
            Err(ActorError::Start("no device".to_string()))
        );
    }
}
