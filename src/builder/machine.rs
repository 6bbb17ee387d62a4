//! Builder for whole machines.

use super::compile::compile;
use super::{DefinitionErrors, InvokeBuilder, StateBuilder, TransitionBuilder};
use crate::core::{Context, ContextFactory, Event, Machine};
use crate::effects::Action;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Fluent builder for a [`Machine`].
///
/// The builder describes the root state node; its id becomes the machine id
/// and the prefix of every derived state id.
///
/// # Example
///
/// ```rust
/// use harel::builder::{MachineBuilder, StateBuilder};
///
/// let machine = MachineBuilder::new("light")
///     .context(0u32)
///     .initial("green")
///     .state(StateBuilder::new("green").on("TIMER", "yellow"))
///     .state(StateBuilder::new("yellow").on("TIMER", "red"))
///     .state(StateBuilder::new("red").on("TIMER", "green"))
///     .build()
///     .unwrap();
///
/// assert!(machine.get("#light.yellow").is_some());
/// ```
pub struct MachineBuilder<C> {
    root: StateBuilder<C>,
    context: Option<ContextFactory<C>>,
}

impl<C: Context> MachineBuilder<C> {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            root: StateBuilder::new(id.clone()).id(id),
            context: None,
        }
    }

    /// Every interpreter starts from a clone of `context`.
    pub fn context(mut self, context: C) -> Self {
        self.context = Some(Arc::new(move |_: &Value| context.clone()));
        self
    }

    /// Build the initial context from the interpreter's input.
    pub fn context_from<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Value) -> C + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(factory));
        self
    }

    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.root = self.root.initial(key);
        self
    }

    /// Make the top-level states orthogonal regions.
    pub fn parallel(mut self) -> Self {
        self.root = self.root.parallel();
        self
    }

    pub fn state(mut self, state: StateBuilder<C>) -> Self {
        self.root = self.root.state(state);
        self
    }

    pub fn states(mut self, states: impl IntoIterator<Item = StateBuilder<C>>) -> Self {
        self.root = self.root.states(states);
        self
    }

    /// Root-level transition, taken when no active descendant handles the
    /// event.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.root = self.root.on(event, transition);
        self
    }

    pub fn always(mut self, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.root = self.root.always(transition);
        self
    }

    pub fn after(mut self, delay: Duration, transition: impl Into<TransitionBuilder<C>>) -> Self {
        self.root = self.root.after(delay, transition);
        self
    }

    pub fn entry(mut self, action: Action<C>) -> Self {
        self.root = self.root.entry(action);
        self
    }

    pub fn exit(mut self, action: Action<C>) -> Self {
        self.root = self.root.exit(action);
        self
    }

    pub fn invoke(mut self, invoke: InvokeBuilder<C>) -> Self {
        self.root = self.root.invoke(invoke);
        self
    }

    /// Output of the machine once a top-level final state is reached.
    /// Without it the final state's own output is used.
    pub fn output<F>(mut self, output: F) -> Self
    where
        F: Fn(&C, &Event) -> Value + Send + Sync + 'static,
    {
        self.root = self.root.output(output);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.root = self.root.tag(tag);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.root = self.root.description(description);
        self
    }

    /// Validate the definition and freeze it.
    ///
    /// All problems are reported together.
    pub fn build(self) -> Result<Machine<C>, DefinitionErrors> {
        compile(self.root, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DefinitionError;
    use crate::core::{Guard, HistoryKind, StateKind};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    struct Form {
        attempts: u32,
    }

    #[test]
    fn builds_nested_machine() {
        let machine = MachineBuilder::new("form")
            .context(Form { attempts: 0 })
            .initial("editing")
            .state(
                StateBuilder::new("editing")
                    .initial("clean")
                    .state(StateBuilder::new("clean").on("CHANGE", "dirty"))
                    .state(StateBuilder::new("dirty"))
                    .on("SUBMIT", "submitted"),
            )
            .state(StateBuilder::new("submitted").final_state())
            .build()
            .unwrap();

        let editing = machine.get("#form.editing").unwrap();
        let clean = machine.get("#form.editing.clean").unwrap();
        assert_eq!(machine.id(), "form");
        assert_eq!(
            machine.node(editing).kind(),
            &StateKind::Compound { initial: clean }
        );
        assert_eq!(machine.node(clean).transitions()[0].candidates.len(), 1);
        assert_eq!(machine.initial_context(&json!(null)), Form { attempts: 0 });
    }

    #[test]
    fn initial_defaults_to_first_non_history_child() {
        let machine = MachineBuilder::new("m")
            .context(())
            .state(StateBuilder::history("hist", HistoryKind::Shallow))
            .state(StateBuilder::new("first"))
            .state(StateBuilder::new("second"))
            .build()
            .unwrap();

        let first = machine.get("#m.first").unwrap();
        assert_eq!(
            machine.node(machine.root()).kind(),
            &StateKind::Compound { initial: first }
        );

        let hist = machine.get("#m.hist").unwrap();
        assert_eq!(
            machine.node(hist).kind(),
            &StateKind::History {
                kind: HistoryKind::Shallow,
                default: vec![first],
            }
        );
    }

    #[test]
    fn resolves_relative_child_and_id_targets() {
        let machine = MachineBuilder::new("m")
            .context(())
            .state(
                StateBuilder::new("a")
                    .id("alpha")
                    .state(StateBuilder::new("a1"))
                    .state(StateBuilder::new("a2"))
                    .on("DOWN", ".a2"),
            )
            .state(
                StateBuilder::new("b")
                    .on("SIBLING", "a.a2")
                    .on("BY_ID", "#alpha.a1"),
            )
            .build()
            .unwrap();

        let a2 = machine.get("#alpha.a2").unwrap();
        let a1 = machine.get("#alpha.a1").unwrap();
        let a = machine.get("#alpha").unwrap();
        let b = machine.get("#m.b").unwrap();

        assert_eq!(machine.node(a).transitions()[0].candidates[0].targets, vec![a2]);
        assert_eq!(machine.node(b).transitions()[0].candidates[0].targets, vec![a2]);
        assert_eq!(machine.node(b).transitions()[1].candidates[0].targets, vec![a1]);
    }

    #[test]
    fn candidates_with_the_same_descriptor_are_grouped() {
        let machine = MachineBuilder::new("m")
            .context(Form { attempts: 0 })
            .state(
                StateBuilder::new("idle")
                    .on(
                        "GO",
                        TransitionBuilder::to("fast").when(|c: &Form, _| c.attempts > 3),
                    )
                    .on("GO", "slow")
                    .on("STOP", "slow"),
            )
            .state(StateBuilder::new("fast"))
            .state(StateBuilder::new("slow"))
            .build()
            .unwrap();

        let idle = machine.node(machine.get("#m.idle").unwrap());
        assert_eq!(idle.transitions().len(), 2);
        assert_eq!(idle.transitions()[0].candidates.len(), 2);
    }

    #[test]
    fn after_and_invoke_transitions_get_generated_events() {
        let machine = MachineBuilder::new("m")
            .context(())
            .state(
                StateBuilder::new("waiting")
                    .after(Duration::from_millis(500), "late")
                    .invoke(
                        InvokeBuilder::new(crate::actor::ActorLogic::callback(|_| Ok(())))
                            .on_done("late"),
                    ),
            )
            .state(StateBuilder::new("late"))
            .build()
            .unwrap();

        let waiting = machine.node(machine.get("#m.waiting").unwrap());
        assert_eq!(waiting.invokes()[0].id(), "m.waiting:invocation[0]");
        assert_eq!(
            waiting.after,
            vec![(
                Duration::from_millis(500),
                Event::after_type(Duration::from_millis(500), "m.waiting")
            )]
        );
        assert!(waiting.transitions()[1]
            .descriptor
            .matches("done.actor.m.waiting:invocation[0]"));
    }

    #[test]
    fn missing_context_is_reported() {
        let result = MachineBuilder::<()>::new("m")
            .state(StateBuilder::new("a"))
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(&DefinitionError::MissingContext));
    }

    #[test]
    fn accumulates_every_error() {
        let result = MachineBuilder::new("m")
            .context(())
            .initial("nowhere")
            .state(StateBuilder::new("a").on("GO", "missing"))
            .state(StateBuilder::new("a"))
            .state(StateBuilder::new("bad.key"))
            .state(StateBuilder::new("p").parallel())
            .state(StateBuilder::new("end").final_state().on("BACK", "a"))
            .state(
                StateBuilder::new("guarded").on(
                    "CHECK",
                    TransitionBuilder::targetless().guard(Guard::in_state("#m.ghost")),
                ),
            )
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(&DefinitionError::InvalidInitial {
            state: "m".to_string(),
            initial: "nowhere".to_string(),
        }));
        assert!(errors.contains(&DefinitionError::UnknownTarget {
            from: "m.a".to_string(),
            target: "missing".to_string(),
        }));
        assert!(errors.contains(&DefinitionError::DuplicateId("m.a".to_string())));
        assert!(errors.contains(&DefinitionError::DuplicateKey {
            parent: "m".to_string(),
            key: "a".to_string(),
        }));
        assert!(errors.contains(&DefinitionError::InvalidKey {
            parent: "m".to_string(),
            key: "bad.key".to_string(),
        }));
        assert!(errors.contains(&DefinitionError::EmptyParallel("m.p".to_string())));
        assert!(errors.contains(&DefinitionError::FinalWithTransitions("m.end".to_string())));
        assert!(errors.contains(&DefinitionError::UnknownGuardState {
            state: "m.guarded".to_string(),
            reference: "#m.ghost".to_string(),
        }));
    }

    #[test]
    fn rejects_bad_history_defaults_and_duplicate_invokes() {
        let result = MachineBuilder::new("m")
            .context(())
            .state(
                StateBuilder::new("a")
                    .state(StateBuilder::new("a1"))
                    .state(StateBuilder::history("h", HistoryKind::Deep).default_target("#m.b")),
            )
            .state(
                StateBuilder::new("b")
                    .invoke(InvokeBuilder::new(crate::actor::ActorLogic::callback(|_| Ok(()))).id("job"))
                    .invoke(InvokeBuilder::new(crate::actor::ActorLogic::callback(|_| Ok(()))).id("job")),
            )
            .state(StateBuilder::new("c").on("", "a"))
            .build();

        let errors = result.unwrap_err();
        assert!(errors.contains(&DefinitionError::InvalidHistoryDefault {
            state: "m.a.h".to_string(),
            target: "#m.b".to_string(),
        }));
        assert!(errors.contains(&DefinitionError::DuplicateInvokeId("job".to_string())));
        assert!(errors.contains(&DefinitionError::InvalidDescriptor {
            state: "m.c".to_string(),
            descriptor: String::new(),
        }));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn multi_targets_must_be_able_to_coexist() {
        let result = MachineBuilder::new("m")
            .context(())
            .state(
                StateBuilder::new("x")
                    .on("SPLIT", TransitionBuilder::targets(["s.y", "s.z"]))
                    .on("BOTH", TransitionBuilder::targets(["p.left.l2", "p.right"]))
                    .on("NESTED", TransitionBuilder::targets(["s", "s.z"])),
            )
            .state(
                StateBuilder::new("s")
                    .state(StateBuilder::new("y"))
                    .state(StateBuilder::new("z")),
            )
            .state(
                StateBuilder::new("p")
                    .parallel()
                    .state(
                        StateBuilder::new("left")
                            .state(StateBuilder::new("l1"))
                            .state(StateBuilder::new("l2")),
                    )
                    .state(StateBuilder::new("right")),
            )
            .build();

        let errors = result.unwrap_err();
        assert_eq!(
            errors.errors(),
            &[DefinitionError::ConflictingTargets {
                from: "m.x".to_string(),
                targets: ("m.s.y".to_string(), "m.s.z".to_string()),
            }]
        );
    }

}
