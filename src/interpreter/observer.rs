//! Snapshot observers and diagnostics.

use super::{InterpreterError, Snapshot};
use crate::step::TransitionConflictError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives every snapshot an interpreter publishes.
///
/// Closures taking `&Snapshot<C>` are observers.
pub trait Observer<C>: Send {
    fn next(&mut self, snapshot: &Snapshot<C>);

    fn error(&mut self, _error: &InterpreterError) {}

    /// The interpreter stopped or finished; nothing more will be published.
    fn complete(&mut self) {}
}

impl<C, F> Observer<C> for F
where
    F: FnMut(&Snapshot<C>) + Send,
{
    fn next(&mut self, snapshot: &Snapshot<C>) {
        self(snapshot)
    }
}

/// Detaches an observer. Dropping the subscription keeps the observer.
#[derive(Clone, Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Safe to call from inside the observer itself; observers registered
    /// later still see the snapshot being published.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct Slot<C> {
    active: Arc<AtomicBool>,
    observer: Box<dyn Observer<C>>,
}

pub(crate) struct Observers<C> {
    slots: Vec<Slot<C>>,
}

impl<C> Observers<C> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer<C>>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        self.slots.push(Slot {
            active: Arc::clone(&active),
            observer,
        });
        Subscription { active }
    }

    pub fn next(&mut self, snapshot: &Snapshot<C>) {
        self.each(|observer| observer.next(snapshot));
    }

    pub fn error(&mut self, error: &InterpreterError) {
        self.each(|observer| observer.error(error));
    }

    pub fn complete(&mut self) {
        self.each(|observer| observer.complete());
        self.slots.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn each(&mut self, mut call: impl FnMut(&mut dyn Observer<C>)) {
        for slot in &mut self.slots {
            if slot.active.load(Ordering::SeqCst) {
                call(slot.observer.as_mut());
            }
        }
        self.slots.retain(|slot| slot.active.load(Ordering::SeqCst));
    }
}

/// Non-fatal findings reported while processing events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Two transitions selected for one microstep exited overlapping
    /// states; the later one was discarded.
    TransitionConflict(TransitionConflictError),
    /// No transition was enabled for the event.
    UnhandledEvent {
        event: String,
        states: Vec<String>,
    },
}

pub(crate) type DiagnosticFn = Box<dyn FnMut(&Diagnostic) + Send>;
