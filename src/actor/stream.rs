//! Push-stream actors.

use super::{ActorError, ActorKind, ActorScope, Behavior};
use crate::core::Event;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::trace;

pub(crate) type StreamFn =
    Arc<dyn Fn(Value) -> BoxStream<'static, Result<Event, String>> + Send + Sync>;

pub(crate) struct StreamBehavior {
    source: StreamFn,
    task: Option<JoinHandle<()>>,
}

impl StreamBehavior {
    pub fn new(source: StreamFn) -> Self {
        Self { source, task: None }
    }
}

impl Behavior for StreamBehavior {
    fn kind(&self) -> ActorKind {
        ActorKind::Stream
    }

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ActorError::NoRuntime)?;
        let mut stream = (self.source)(scope.input().clone());
        self.task = Some(runtime.spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        if !scope.send(event) {
                            return;
                        }
                    }
                    Err(message) => {
                        scope.fail(message);
                        return;
                    }
                }
            }
            scope.complete(Value::Null);
        }));
        Ok(())
    }

    fn receive(&mut self, event: Event) -> Result<(), ActorError> {
        trace!(event = %event, "stream actors ignore events");
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

    fn scope() -> (ActorScope, crate::actor::Inbox) {
        let (mailbox, inbox) = Mailbox::channel();
        let origin = Origin {
            id: "ticks".to_string(),
            seq: 0,
        };
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        (ActorScope::new(origin, mailbox, clock, Value::Null), inbox)
    }

    async fn next_event(inbox: &mut crate::actor::Inbox) -> (Event, bool) {
        match inbox.recv().await {
            Some(Envelope::Event { event, terminal, .. }) => (event, terminal),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn forwards_items_then_completes() {
        let logic = ActorLogic::stream(|_| {
            futures::stream::iter(vec![Ok(Event::new("TICK")), Ok(Event::new("TICK"))])
        });
        let (scope, mut inbox) = scope();
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();

        assert_eq!(next_event(&mut inbox).await, (Event::new("TICK"), false));
        assert_eq!(next_event(&mut inbox).await, (Event::new("TICK"), false));
        let (done, terminal) = next_event(&mut inbox).await;
        assert!(terminal);
        assert_eq!(done.event_type(), "done.actor.ticks");
    }

    #[tokio::test]
    async fn error_item_fails_the_actor() {
        let logic = ActorLogic::stream(|_| {
            futures::stream::iter(vec![Ok(Event::new("TICK")), Err("disconnected".to_string())])
        });
        let (scope, mut inbox) = scope();
        let mut behavior = logic.create();

        behavior.start(scope).unwrap();

        next_event(&mut inbox).await;
        let (failure, terminal) = next_event(&mut inbox).await;
        assert!(terminal);
        assert!(failure.is_actor_error());
    }
}
