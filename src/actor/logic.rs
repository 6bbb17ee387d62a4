//! Tagged descriptors for spawnable behaviors.

use super::callback::{CallbackBehavior, CallbackFn};
use super::machine::MachineBehavior;
use super::promise::{PromiseBehavior, PromiseFn};
use super::stream::{StreamBehavior, StreamFn};
use super::{ActorKind, Behavior, CallbackArgs};
use crate::core::{Context, Event, Machine};
use crate::effects::InputFn;
use futures::future::FutureExt;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Box<dyn Behavior> + Send + Sync>;

/// How to create a child actor. Each spawn creates a fresh behavior.
///
/// # Example
///
/// ```rust
/// use harel::actor::{ActorKind, ActorLogic};
/// use serde_json::json;
///
/// let fetch = ActorLogic::promise(|input| async move {
///     Ok(json!({ "user": input["id"] }))
/// });
/// assert_eq!(fetch.kind(), ActorKind::Promise);
/// ```
#[derive(Clone)]
pub enum ActorLogic {
    Machine(Factory),
    Promise(PromiseFn),
    Callback(CallbackFn),
    Stream(StreamFn),
    Custom(Factory),
}

impl ActorLogic {
    /// A nested machine. Its `send_parent` actions reach the spawning
    /// interpreter; reaching its final state completes the actor with the
    /// machine's output.
    pub fn machine<C: Context>(machine: impl Into<Arc<Machine<C>>>) -> Self {
        let machine = machine.into();
        ActorLogic::Machine(Arc::new(move || {
            Box::new(MachineBehavior::new(Arc::clone(&machine))) as Box<dyn Behavior>
        }))
    }

    /// A one-shot future: `Ok` completes the actor with its output, `Err`
    /// fails it.
    pub fn promise<F, Fut>(run: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        ActorLogic::Promise(Arc::new(move |input| run(input).boxed()))
    }

    /// An imperative process set up once on start. See [`CallbackArgs`].
    pub fn callback<F>(setup: F) -> Self
    where
        F: Fn(&mut CallbackArgs) -> Result<(), String> + Send + Sync + 'static,
    {
        ActorLogic::Callback(Arc::new(setup))
    }

    /// A stream of events forwarded to the parent until it ends (done) or
    /// yields an error (failed).
    pub fn stream<F, S>(source: F) -> Self
    where
        F: Fn(Value) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Event, String>> + Send + 'static,
    {
        ActorLogic::Stream(Arc::new(move |input| source(input).boxed()))
    }

    /// Any other [`Behavior`].
    pub fn custom<F, B>(create: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior + 'static,
    {
        ActorLogic::Custom(Arc::new(move || Box::new(create()) as Box<dyn Behavior>))
    }

    pub fn kind(&self) -> ActorKind {
        match self {
            ActorLogic::Machine(_) => ActorKind::Machine,
            ActorLogic::Promise(_) => ActorKind::Promise,
            ActorLogic::Callback(_) => ActorKind::Callback,
            ActorLogic::Stream(_) => ActorKind::Stream,
            ActorLogic::Custom(_) => ActorKind::Custom,
        }
    }

    pub(crate) fn create(&self) -> Box<dyn Behavior> {
        match self {
            ActorLogic::Machine(factory) | ActorLogic::Custom(factory) => factory(),
            ActorLogic::Promise(run) => Box::new(PromiseBehavior::new(Arc::clone(run))),
            ActorLogic::Callback(setup) => Box::new(CallbackBehavior::new(Arc::clone(setup))),
            ActorLogic::Stream(source) => Box::new(StreamBehavior::new(Arc::clone(source))),
        }
    }
}

impl fmt::Debug for ActorLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorLogic").field(&self.kind()).finish()
    }
}

/// An actor declared on a state node, started on entry and stopped on exit.
pub struct InvokeDef<C> {
    pub(crate) id: String,
    pub(crate) logic: ActorLogic,
    pub(crate) input: Option<InputFn<C>>,
}

impl<C> InvokeDef<C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logic(&self) -> &ActorLogic {
        &self.logic
    }
}

impl<C> fmt::Debug for InvokeDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeDef")
            .field("id", &self.id)
            .field("logic", &self.logic)
            .finish()
    }
}
