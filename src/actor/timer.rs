//! Timer actors behind `after` transitions and delayed events.

use super::mailbox::Delivery;
use super::{ActorError, ActorKind, ActorScope, Behavior, TimerHandle};
use crate::core::Event;
use std::sync::Arc;
use std::time::Duration;

/// Delivers one message after a delay unless stopped first.
pub(crate) struct TimerBehavior {
    delay: Duration,
    delivery: Delivery,
    handle: Option<TimerHandle>,
}

impl TimerBehavior {
    pub fn new(delay: Duration, delivery: Delivery) -> Self {
        Self {
            delay,
            delivery,
            handle: None,
        }
    }
}

impl Behavior for TimerBehavior {
    fn kind(&self) -> ActorKind {
        ActorKind::Timer
    }

    fn start(&mut self, scope: ActorScope) -> Result<(), ActorError> {
        let delivery = self.delivery.clone();
        let clock = Arc::clone(scope.clock());
        let handle = clock.schedule(
            self.delay,
            Box::new(move || {
                scope.fire(delivery);
            }),
        )?;
        self.handle = Some(handle);
        Ok(())
    }

    fn receive(&mut self, event: Event) -> Result<(), ActorError> {
        Err(ActorError::Receive {
            event: event.event_type,
            message: "timers do not accept events".to_string(),
        })
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Clock, Envelope, Mailbox, Origin, SimulatedClock};
    use serde_json::Value;

    fn scope(clock: &SimulatedClock) -> (ActorScope, crate::actor::Inbox) {
        let (mailbox, inbox) = Mailbox::channel();
        let origin = Origin {
            id: "after".to_string(),
            seq: 7,
        };
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        (ActorScope::new(origin, mailbox, clock, Value::Null), inbox)
    }

    #[test]
    fn fires_delivery_with_origin() {
        let clock = SimulatedClock::new();
        let (scope, mut inbox) = scope(&clock);
        let mut timer = TimerBehavior::new(
            Duration::from_millis(100),
            Delivery::Event(Event::new("TIMEOUT")),
        );

        timer.start(scope).unwrap();
        assert!(inbox.try_recv().is_err());
        clock.advance(Duration::from_millis(100));

        match inbox.try_recv() {
            Ok(Envelope::TimerFired {
                origin,
                delivery: Delivery::Event(event),
            }) => {
                assert_eq!(origin.seq, 7);
                assert_eq!(event.event_type(), "TIMEOUT");
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn stop_cancels_pending_delivery() {
        let clock = SimulatedClock::new();
        let (scope, mut inbox) = scope(&clock);
        let mut timer = TimerBehavior::new(
            Duration::from_millis(100),
            Delivery::Event(Event::new("TIMEOUT")),
        );

        timer.start(scope).unwrap();
        timer.stop();
        timer.stop();
        clock.advance(Duration::from_secs(1));

        assert!(inbox.try_recv().is_err());
    }
}
