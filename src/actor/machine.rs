//! Child machines run as actors of their parent interpreter.

use super::{ActorError, ActorKind, ActorScope, Behavior};
use crate::core::{Context, Event, Machine};
use crate::interpreter::{Interpreter, InterpreterOptions, Status};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Runs a nested interpreter on a mailbox linked to the parent's.
///
/// The child never runs on its own: the parent drives it by forwarding
/// events and by waking it when something lands in its mailbox, so the
/// whole tree keeps one run-to-completion order.
pub(crate) struct MachineBehavior<C: Context> {
    machine: Arc<Machine<C>>,
    interpreter: Option<Interpreter<C>>,
    scope: Option<ActorScope>,
    reported: bool,
}

impl<C: Context> MachineBehavior<C> {
    pub fn new(machine: Arc<Machine<C>>) -> Self {
        Self {
            machine,
            interpreter: None,
            scope: None,
            reported: false,
        }
    }

    /// Tell the parent once the child has finished.
    fn report(&mut self) {
        if self.reported {
            return;
        }
        let (Some(interpreter), Some(scope)) = (&self.interpreter, &self.scope) else {
            return;
        };
        if interpreter.status() == Status::Done {
            self.reported = true;
            scope.complete(interpreter.output().cloned().unwrap_or(Value::Null));
        }
    }

    fn interpreter(&mut self) -> Result<&mut Interpreter<C>, ActorError> {
        self.interpreter
            .as_mut()
            .ok_or_else(|| ActorError::Failed("machine actor was not started".to_string()))
    }
}

impl<C: Context> Behavior for MachineBehavior<C> {
    fn kind(&self) -> ActorKind {
        ActorKind::Machine
    }

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError> {
        let options = InterpreterOptions::default()
            .with_id(scope.id())
            .with_input(scope.input().clone())
            .with_shared_clock(Arc::clone(scope.clock()));
        let mut interpreter = Interpreter::linked(Arc::clone(&self.machine), options, scope.clone());
        let started = interpreter.start();
        self.interpreter = Some(interpreter);
        self.scope = Some(scope);
        if let Err(error) = started {
            self.reported = true;
            return Err(ActorError::Start(error.to_string()));
        }
        self.report();
        Ok(())
    }

    fn receive(&mut self, event: Event) -> Result<(), ActorError> {
        let event_type = event.event_type().to_string();
        if let Err(error) = self.interpreter()?.send(event) {
            self.reported = true;
            return Err(ActorError::Receive {
                event: event_type,
                message: error.to_string(),
            });
        }
        self.report();
        Ok(())
    }

    fn wake(&mut self) -> Result<(), ActorError> {
        if let Err(error) = self.interpreter()?.flush() {
            self.reported = true;
            return Err(ActorError::Failed(error.to_string()));
        }
        self.report();
        Ok(())
    }

    fn stop(&mut self) {
        self.reported = true;
        if let Some(interpreter) = self.interpreter.as_mut() {
            if let Err(error) = interpreter.stop() {
                debug!(actor = %interpreter.id(), %error, "exit action failed while stopping child machine");
            }
        }
    }

    fn snapshot(&self) -> Option<Value> {
        let snapshot = self.interpreter.as_ref()?.snapshot();
        Some(json!({
            "value": serde_json::to_value(snapshot.value()).unwrap_or(Value::Null),
            "status": snapshot.status(),
            "output": snapshot.output(),
        }))
    }
}
