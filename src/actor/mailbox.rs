//! Per-interpreter mailboxes.
//!
//! Every interpreter owns the receiving half of an unbounded channel; actor
//! handles, timers and spawned tasks hold clones of the sending half. A
//! child machine's mailbox is linked to its parent: posting to it also posts
//! a [`Envelope::Wake`] upwards, so the root interpreter is the single place
//! that drains work and run-to-completion order holds across the tree.

use crate::core::Event;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identity of a registered actor instance.
///
/// The sequence number distinguishes two actors that reused one id, so
/// late events from a stopped instance are never attributed to its
/// replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Origin {
    pub id: String,
    pub seq: u64,
}

/// What a fired timer delivers.
#[derive(Clone, Debug)]
pub(crate) enum Delivery {
    /// Processed as an event of the owning interpreter.
    Event(Event),
    /// Forwarded to a child actor.
    Forward { to: String, event: Event },
    /// Sent to the owning interpreter's parent.
    Parent(Event),
}

#[derive(Debug)]
pub(crate) enum Envelope {
    /// An event for the interpreter. `origin` is set when a child actor sent
    /// it; `terminal` marks the child's last event.
    Event {
        origin: Option<Origin>,
        event: Event,
        terminal: bool,
    },
    /// An event for a child actor, routed through its parent.
    Forward { to: String, event: Event },
    /// A linked child has work queued.
    Wake { child: String },
    TimerFired { origin: Origin, delivery: Delivery },
    Stop,
}

#[derive(Debug)]
struct Link {
    parent: Mailbox,
    child: String,
}

/// Sending half of an interpreter's queue.
#[derive(Clone, Debug)]
pub(crate) struct Mailbox {
    tx: mpsc::UnboundedSender<Envelope>,
    link: Option<Arc<Link>>,
}

pub(crate) type Inbox = mpsc::UnboundedReceiver<Envelope>;

impl Mailbox {
    /// A root mailbox and its receiver.
    pub fn channel() -> (Self, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, link: None }, rx)
    }

    /// A mailbox whose posts wake `child` inside `parent`.
    pub fn linked(parent: Mailbox, child: impl Into<String>) -> (Self, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Link {
            parent,
            child: child.into(),
        };
        (
            Self {
                tx,
                link: Some(Arc::new(link)),
            },
            rx,
        )
    }

    /// Queue an envelope and wake the ancestors that must drain it.
    ///
    /// Returns false once the owning interpreter is gone.
    pub fn post(&self, envelope: Envelope) -> bool {
        if self.tx.send(envelope).is_err() {
            return false;
        }
        if let Some(link) = &self.link {
            link.parent.post(Envelope::Wake {
                child: link.child.clone(),
            });
        }
        true
    }

    /// Queue an envelope from the owning interpreter itself, which drains
    /// its queue before returning anyway.
    pub fn post_local(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
