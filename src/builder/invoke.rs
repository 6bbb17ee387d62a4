use super::TransitionBuilder;
use crate::actor::ActorLogic;
use crate::core::Event;
use crate::effects::InputFn;
use serde_json::Value;
use std::sync::Arc;

/// An actor started when its state is entered and stopped when it exits.
///
/// ```rust
/// use harel::actor::ActorLogic;
/// use harel::builder::{InvokeBuilder, MachineBuilder, StateBuilder};
/// use serde_json::json;
///
/// let machine = MachineBuilder::new("profile")
///     .context(json!(null))
///     .initial("loading")
///     .state(
///         StateBuilder::new("loading").invoke(
///             InvokeBuilder::new(ActorLogic::promise(|_| async { Ok(json!({ "name": "Ada" })) }))
///                 .id("fetch")
///                 .on_done("ready")
///                 .on_error("failed"),
///         ),
///     )
///     .state(StateBuilder::new("ready"))
///     .state(StateBuilder::new("failed"))
///     .build()
///     .unwrap();
/// assert_eq!(machine.node(machine.get("#profile.loading").unwrap()).invokes()[0].id(), "fetch");
/// ```
pub struct InvokeBuilder<C> {
    pub(crate) logic: ActorLogic,
    pub(crate) id: Option<String>,
    pub(crate) input: Option<InputFn<C>>,
    pub(crate) on_done: Vec<TransitionBuilder<C>>,
    pub(crate) on_error: Vec<TransitionBuilder<C>>,
}

impl<C> InvokeBuilder<C> {
    pub fn new(logic: ActorLogic) -> Self {
        Self {
            logic,
            id: None,
            input: None,
            on_done: Vec::new(),
            on_error: Vec::new(),
        }
    }

    /// Actor id; defaults to `<state id>:invocation[<n>]`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Input computed from the context and the event that entered the state.
    pub fn input<F>(mut self, input: F) -> Self
    where
        F: Fn(&C, &Event) -> Value + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(input));
        self
    }

    /// Transition taken on `done.actor.<id>`.
    pub fn on_done(mut self, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.on_done.push(transition.into());
        self
    }

    /// Transition taken on `error.actor.<id>`.
    pub fn on_error(mut self, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.on_error.push(transition.into());
        self
    }
}
