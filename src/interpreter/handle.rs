//! Driving an interpreter from a tokio task.

use super::{InterpreterError, Snapshot, TaskError};
use crate::actor::{Envelope, Mailbox};
use crate::core::Event;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cloneable handle to an interpreter running in its own task.
pub struct InterpreterHandle<C> {
    pub(crate) mailbox: Mailbox,
    pub(crate) snapshots: watch::Receiver<Snapshot<C>>,
}

impl<C> Clone for InterpreterHandle<C> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<C: Clone> InterpreterHandle<C> {
    /// Queue an event. Returns false once the task has ended.
    pub fn send(&self, event: impl Into<Event>) -> bool {
        self.mailbox.post(Envelope::Event {
            origin: None,
            event: event.into(),
            terminal: false,
        })
    }

    /// Ask the interpreter to stop after the events already queued.
    pub fn stop(&self) -> bool {
        self.mailbox.post(Envelope::Stop)
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Snapshot<C> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<C>> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// Returns `None` if the task ends first.
    pub async fn wait_for(&self, predicate: impl Fn(&Snapshot<C>) -> bool) -> Option<Snapshot<C>> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots.wait_for(|snapshot| predicate(snapshot)).await.ok()?;
        Some(snapshot.clone())
    }
}

impl<C> fmt::Debug for InterpreterHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterHandle")
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

/// Resolves to the final snapshot once the interpreter stops or finishes.
pub struct InterpreterTask<C> {
    pub(crate) join: JoinHandle<Result<Snapshot<C>, InterpreterError>>,
}

impl<C> InterpreterTask<C> {
    /// Abort the task without running exit actions.
    pub fn abort(&self) {
        self.join.abort();
    }
}

impl<C> Future for InterpreterTask<C> {
    type Output = Result<Snapshot<C>, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().join).poll(cx) {
            Poll::Ready(Ok(Ok(snapshot))) => Poll::Ready(Ok(snapshot)),
            Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(TaskError::Interpreter(error))),
            Poll::Ready(Err(error)) => Poll::Ready(Err(TaskError::Join(error))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<C> fmt::Debug for InterpreterTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterTask")
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
