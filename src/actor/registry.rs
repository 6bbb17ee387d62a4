//! Instance-scoped registry of the actors one interpreter owns.

use super::mailbox::{Mailbox, Origin};
use super::{ActorError, ActorKind, ActorRef, ActorScope, ActorStatus, Behavior, Clock};
use crate::core::{Event, StateId};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Everything needed to start one actor.
pub(crate) struct SpawnRequest {
    pub id: String,
    /// State whose exit stops the actor; `None` for machine-scoped actors.
    pub owner: Option<StateId>,
    pub depth: usize,
    pub behavior: Box<dyn Behavior>,
    pub input: Value,
}

struct Entry {
    seq: u64,
    owner: Option<StateId>,
    depth: usize,
    behavior: Box<dyn Behavior>,
    status: watch::Sender<ActorStatus>,
    handle: ActorRef,
}

impl Entry {
    fn close(mut self, status: ActorStatus) {
        self.behavior.stop();
        self.status.send_replace(status);
    }
}

/// Live actors by id.
#[derive(Default)]
pub(crate) struct Registry {
    entries: BTreeMap<String, Entry>,
    next_seq: u64,
    anonymous: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an actor and register it.
    ///
    /// A running actor with the same id is stopped first. A behavior that
    /// fails to start stays registered until its `error.actor.<id>` event
    /// is processed, like any other failure.
    pub fn spawn(&mut self, request: SpawnRequest, mailbox: &Mailbox, clock: &Arc<dyn Clock>) -> ActorRef {
        let SpawnRequest {
            id,
            owner,
            depth,
            mut behavior,
            input,
        } = request;

        if let Some(previous) = self.entries.remove(&id) {
            warn!(actor = %id, "replacing a running actor that used the same id");
            previous.close(ActorStatus::Stopped);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let kind = behavior.kind();
        let scope = ActorScope::new(
            Origin {
                id: id.clone(),
                seq,
            },
            mailbox.clone(),
            Arc::clone(clock),
            input,
        );
        let (status, receiver) = watch::channel(ActorStatus::Active);
        let handle = ActorRef::new(id.clone(), kind, receiver, mailbox.clone());

        trace!(actor = %id, %kind, "starting actor");
        if let Err(error) = behavior.start(scope.clone()) {
            debug!(actor = %id, %error, "actor failed to start");
            scope.fail(error.to_string());
        }

        self.entries.insert(
            id,
            Entry {
                seq,
                owner,
                depth,
                behavior,
                status,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// A fresh id for actors and delayed events that were not given one.
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.anonymous += 1;
        format!("{prefix}[{}]", self.anonymous)
    }

    /// Whether events from `origin` may still be delivered.
    pub fn accepts(&self, origin: &Origin) -> bool {
        self.entries
            .get(&origin.id)
            .is_some_and(|entry| entry.seq == origin.seq)
    }

    /// Unregister an actor that reported its last event.
    pub fn finish(&mut self, origin: &Origin, status: ActorStatus) -> bool {
        if !self.accepts(origin) {
            return false;
        }
        match self.entries.remove(&origin.id) {
            Some(entry) => {
                entry.close(status);
                true
            }
            None => false,
        }
    }

    /// Stop an actor by id.
    pub fn stop(&mut self, id: &str) -> bool {
        self.remove(id, ActorStatus::Stopped)
    }

    /// Stop an actor that misbehaved while handling a message.
    pub fn fail(&mut self, id: &str) -> bool {
        self.remove(id, ActorStatus::Error)
    }

    fn remove(&mut self, id: &str, status: ActorStatus) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                trace!(actor = %id, ?status, "actor removed");
                entry.close(status);
                true
            }
            None => false,
        }
    }

    /// Cancel a pending delayed event. Other actors are left alone.
    pub fn cancel_timer(&mut self, id: &str) -> bool {
        let is_timer = self
            .entries
            .get(id)
            .is_some_and(|entry| entry.handle.kind() == ActorKind::Timer);
        is_timer && self.stop(id)
    }

    /// Stop every actor owned by `state`, deepest first.
    pub fn stop_owned_by(&mut self, state: StateId) -> usize {
        self.stop_where(|entry| entry.owner == Some(state))
    }

    /// Stop everything, deepest first.
    pub fn stop_all(&mut self) -> usize {
        self.stop_where(|_| true)
    }

    fn stop_where(&mut self, predicate: impl Fn(&Entry) -> bool) -> usize {
        let mut doomed: Vec<(Reverse<usize>, Reverse<u64>, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, entry)| (Reverse(entry.depth), Reverse(entry.seq), id.clone()))
            .collect();
        doomed.sort();
        for (_, _, id) in &doomed {
            self.stop(id);
        }
        doomed.len()
    }

    /// Deliver an event to an actor. `None` when no such actor is live.
    pub fn receive(&mut self, id: &str, event: Event) -> Option<Result<(), ActorError>> {
        let entry = self.entries.get_mut(id)?;
        Some(entry.behavior.receive(event))
    }

    /// Let a linked child drain its mailbox.
    pub fn wake(&mut self, id: &str) -> Option<Result<(), ActorError>> {
        let entry = self.entries.get_mut(id)?;
        Some(entry.behavior.wake())
    }

    pub fn get(&self, id: &str) -> Option<&ActorRef> {
        self.entries.get(id).map(|entry| &entry.handle)
    }

    pub fn snapshot(&self, id: &str) -> Option<Value> {
        self.entries.get(id).and_then(|entry| entry.behavior.snapshot())
    }

    /// Handles of every live actor except internal timers.
    pub fn children(&self) -> Vec<ActorRef> {
        self.entries
            .values()
            .filter(|entry| entry.handle.kind() != ActorKind::Timer)
            .map(|entry| entry.handle.clone())
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("actors", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
