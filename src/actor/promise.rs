//! One-shot future actors.

use super::{ActorError, ActorKind, ActorScope, Behavior};
use crate::core::Event;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::trace;

pub(crate) type PromiseFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

pub(crate) struct PromiseBehavior {
    run: PromiseFn,
    task: Option<JoinHandle<()>>,
}

impl PromiseBehavior {
    pub fn new(run: PromiseFn) -> Self {
        Self { run, task: None }
    }
}

impl Behavior for PromiseBehavior {
    fn kind(&self) -> ActorKind {
        ActorKind::Promise
    }

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ActorError::NoRuntime)?;
        let future = (self.run)(scope.input().clone());
        self.task = Some(runtime.spawn(async move {
            match future.await {
                Ok(output) => scope.complete(output),
                Err(message) => scope.fail(message),
            };
        }));
        Ok(())
    }

    fn receive(&mut self, event: Event) -> Result<(), ActorError> {
        trace!(event = %event, "promise actors ignore events");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorLogic, Clock, Envelope, Mailbox, Origin, TokioClock};
    use serde_json::json;

    fn scope(input: Value) -> (ActorScope, crate::actor::Inbox) {
        let (mailbox, inbox) = Mailbox::channel();
        let origin = Origin {
            id: "fetch".to_string(),
            seq: 0,
        };
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        (ActorScope::new(origin, mailbox, clock, input), inbox)
    }

    #[tokio::test]
    async fn resolves_to_done_event() {
        let logic = ActorLogic::promise(|input| async move { Ok(json!({ "echo": input })) });
        let (scope, mut inbox) = scope(json!(5));
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();

        match inbox.recv().await {
            Some(Envelope::Event { event, terminal, .. }) => {
                assert!(terminal);
                assert_eq!(event.event_type(), "done.actor.fetch");
                assert_eq!(event.data(), &json!({ "echo": 5 }));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_becomes_error_event() {
        let logic = ActorLogic::promise(|_| async { Err("timeout".to_string()) });
        let (scope, mut inbox) = scope(Value::Null);
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();

        match inbox.recv().await {
            Some(Envelope::Event { event, .. }) => {
                assert!(event.is_actor_error());
                assert_eq!(event.data(), &json!("timeout"));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn needs_a_runtime() {
        let logic = ActorLogic::promise(|_| async { Ok(Value::Null) });
        let (scope, _inbox) = scope(Value::Null);

        assert_eq!(logic.create().start(scope), Err(ActorError::NoRuntime));
    }
}
