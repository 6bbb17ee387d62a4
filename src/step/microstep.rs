//! The microstep engine.
//!
//! A microstep applies one set of selected transitions: record history,
//! exit (exit actions, then stop owned actors), run transition actions,
//! enter (entry actions, start invocations and delay timers, raise done
//! events). A macrostep is the microstep for one event followed by
//! stabilization: eventless transitions first, then raised events from the
//! internal queue, until nothing is enabled.
//!
//! The engine works on a scratch [`StepState`]; the interpreter commits it
//! only when the whole macrostep succeeds.

use super::error::InfiniteMicrostepLoopError;
use super::resolver::{
    entry_set, exit_set, initial_entry_set, record_history, select_transitions,
    transition_domain,
};
use crate::actor::{ActorScope, Clock, Delivery, Envelope, Mailbox, Registry, SpawnRequest, TimerBehavior};
use crate::core::{Configuration, Event, HistoryRecords, Machine, StateId};
use crate::effects::{Action, ActionError, ActionScope, ScopeCommand, SendTarget, TransitionRef};
use crate::interpreter::InterpreterError;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default cap on microsteps per macrostep.
pub const DEFAULT_MAX_MICROSTEPS: usize = 1000;

/// Everything a macrostep may change.
#[derive(Clone, Debug)]
pub(crate) struct StepState<C> {
    pub configuration: Configuration,
    pub context: C,
    pub history: HistoryRecords,
    pub internal: VecDeque<Event>,
    pub done: bool,
    pub output: Option<Value>,
}

impl<C> StepState<C> {
    pub fn new(context: C) -> Self {
        Self {
            configuration: Configuration::new(),
            context,
            history: HistoryRecords::new(),
            internal: VecDeque::new(),
            done: false,
            output: None,
        }
    }
}

/// The interpreter resources a step may use.
pub(crate) struct StepEnv<'a, C> {
    pub machine: &'a Machine<C>,
    pub registry: &'a mut Registry,
    pub mailbox: &'a Mailbox,
    pub clock: &'a Arc<dyn Clock>,
    pub parent: Option<&'a ActorScope>,
    pub max_microsteps: usize,
    pub conflicts: Vec<super::TransitionConflictError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Outcome {
    /// Whether the triggering event enabled any transition.
    pub handled: bool,
    pub microsteps: usize,
}

struct Budget<'e> {
    limit: usize,
    used: usize,
    trigger: &'e str,
}

impl<'e> Budget<'e> {
    fn new(limit: usize, trigger: &'e str) -> Self {
        Self {
            limit,
            used: 0,
            trigger,
        }
    }

    fn spend(&mut self) -> Result<(), InfiniteMicrostepLoopError> {
        self.used += 1;
        if self.used > self.limit {
            return Err(InfiniteMicrostepLoopError {
                limit: self.limit,
                event: self.trigger.to_string(),
            });
        }
        Ok(())
    }
}

/// Enter the initial configuration and stabilize.
pub(crate) fn initialize<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    event: &Event,
) -> Result<Outcome, InterpreterError> {
    let mut budget = Budget::new(env.max_microsteps, &event.event_type);
    budget.spend()?;
    let entries = initial_entry_set(env.machine);
    enter_states(state, env, &entries, event)?;
    stabilize(state, env, event.clone(), &mut budget)?;
    Ok(Outcome {
        handled: true,
        microsteps: budget.used,
    })
}

/// Restart the actors of a restored configuration without running entry
/// actions.
pub(crate) fn resume<C>(state: &mut StepState<C>, env: &mut StepEnv<'_, C>, event: &Event) {
    let active: Vec<StateId> = state.configuration.iter().collect();
    for active_state in active {
        start_invocations(state, env, active_state, event);
        start_delays(env, active_state);
    }
}

/// Process one event to completion.
pub(crate) fn macrostep<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    event: &Event,
) -> Result<Outcome, InterpreterError> {
    let mut budget = Budget::new(env.max_microsteps, &event.event_type);
    let transitions = select(state, env, event, false)?;
    let handled = !transitions.is_empty();
    if handled {
        budget.spend()?;
        microstep(state, env, &transitions, event)?;
    }
    stabilize(state, env, event.clone(), &mut budget)?;
    Ok(Outcome {
        handled,
        microsteps: budget.used,
    })
}

fn select<C>(
    state: &StepState<C>,
    env: &mut StepEnv<'_, C>,
    event: &Event,
    eventless: bool,
) -> Result<Vec<TransitionRef>, InterpreterError> {
    let selection = select_transitions(
        env.machine,
        &state.configuration,
        &state.history,
        &state.context,
        event,
        eventless,
    )?;
    for conflict in &selection.conflicts {
        warn!(machine = %env.machine.id(), %conflict, "transition conflict");
    }
    env.conflicts.extend(selection.conflicts);
    Ok(selection.transitions)
}

fn stabilize<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    mut current: Event,
    budget: &mut Budget<'_>,
) -> Result<(), InterpreterError> {
    while !state.done {
        let eventless = select(state, env, &current, true)?;
        if !eventless.is_empty() {
            budget.spend()?;
            microstep(state, env, &eventless, &current)?;
            continue;
        }

        let Some(raised) = state.internal.pop_front() else {
            break;
        };
        current = raised;
        let transitions = select(state, env, &current, false)?;
        if !transitions.is_empty() {
            budget.spend()?;
            microstep(state, env, &transitions, &current)?;
        }
    }
    if state.done {
        state.internal.clear();
    }
    Ok(())
}

fn microstep<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    transitions: &[TransitionRef],
    event: &Event,
) -> Result<(), InterpreterError> {
    let machine = env.machine;
    let exits = exit_set(machine, &state.configuration, &state.history, transitions);
    state.history = record_history(machine, &state.configuration, &state.history, &exits);

    for &exiting in &exits {
        let node = machine.node(exiting);
        trace!(state = %node.id(), "exit");
        let owner = node.parent().unwrap_or(exiting);
        execute(state, env, &node.exit, event, owner)?;
        env.registry.stop_owned_by(exiting);
        state.configuration.remove(exiting);
    }

    for &transition in transitions {
        let domain = transition_domain(machine, &state.history, transition);
        let candidate = machine.candidate(transition);
        execute(state, env, &candidate.actions, event, domain)?;
    }

    let entries = entry_set(machine, &state.history, transitions);
    enter_states(state, env, &entries, event)
}

fn enter_states<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    entries: &[StateId],
    event: &Event,
) -> Result<(), InterpreterError> {
    let machine = env.machine;
    let mut completed = BTreeSet::new();
    for &entering in entries {
        let node = machine.node(entering);
        state.configuration.insert(entering);
        trace!(state = %node.id(), "enter");
        execute(state, env, &node.entry, event, entering)?;
        start_invocations(state, env, entering, event);
        start_delays(env, entering);
        if node.is_final() {
            complete(state, machine, entering, event, &mut completed);
        }
    }
    Ok(())
}

/// Raise the done events caused by entering the final state `reached`, and
/// finish the machine when the root completes.
fn complete<C>(
    state: &mut StepState<C>,
    machine: &Machine<C>,
    reached: StateId,
    event: &Event,
    completed: &mut BTreeSet<StateId>,
) {
    let node = machine.node(reached);
    let output = node
        .output
        .as_ref()
        .map(|output| output(&state.context, event));
    let Some(parent) = node.parent() else {
        return;
    };
    let parent_node = machine.node(parent);

    if parent_node.is_compound() && parent != machine.root() {
        let data = output.clone().unwrap_or(Value::Null);
        state
            .internal
            .push_back(Event::done_state(parent_node.id(), data));
    }

    let mut marker = if parent_node.is_parallel() {
        Some(parent)
    } else {
        parent_node.parent()
    };
    let mut completion = marker.unwrap_or(reached);
    while let Some(ancestor) = marker {
        let ancestor_node = machine.node(ancestor);
        if !ancestor_node.is_parallel()
            || completed.contains(&ancestor)
            || !machine.in_final_state(&state.configuration, ancestor)
        {
            break;
        }
        completed.insert(ancestor);
        if ancestor != machine.root() {
            state
                .internal
                .push_back(Event::done_state(ancestor_node.id(), Value::Null));
        }
        completion = ancestor;
        marker = ancestor_node.parent();
    }
    if marker.is_some() {
        return;
    }

    state.done = true;
    let root = machine.node(machine.root());
    state.output = match &root.output {
        Some(machine_output) => {
            let done = Event::done_state(
                machine.node(completion).id(),
                output.unwrap_or(Value::Null),
            );
            Some(machine_output(&state.context, &done))
        }
        None => output,
    };
}

fn start_invocations<C>(
    state: &StepState<C>,
    env: &mut StepEnv<'_, C>,
    owner: StateId,
    event: &Event,
) {
    let node = env.machine.node(owner);
    for invoke in &node.invokes {
        let input = invoke
            .input
            .as_ref()
            .map_or(Value::Null, |input| input(&state.context, event));
        debug!(machine = %env.machine.id(), actor = %invoke.id, "invoking actor");
        env.registry.spawn(
            SpawnRequest {
                id: invoke.id.clone(),
                owner: Some(owner),
                depth: node.depth(),
                behavior: invoke.logic.create(),
                input,
            },
            env.mailbox,
            env.clock,
        );
    }
}

fn start_delays<C>(env: &mut StepEnv<'_, C>, owner: StateId) {
    let node = env.machine.node(owner);
    for (delay, event_type) in &node.after {
        let timer = TimerBehavior::new(*delay, Delivery::Event(Event::new(event_type.clone())));
        env.registry.spawn(
            SpawnRequest {
                id: event_type.clone(),
                owner: Some(owner),
                depth: node.depth(),
                behavior: Box::new(timer),
                input: Value::Null,
            },
            env.mailbox,
            env.clock,
        );
    }
}

/// Run actions in order. `owner` is the state that owns actors spawned by
/// them.
fn execute<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    actions: &[Action<C>],
    event: &Event,
    owner: StateId,
) -> Result<(), InterpreterError> {
    for action in actions {
        match action {
            Action::Assign { name, assign } => {
                state.context =
                    assign(&state.context, event).map_err(|message| ActionError {
                        action: name.clone(),
                        message,
                    })?;
            }
            Action::Raise {
                event: make,
                delay,
                id,
            } => {
                let raised = make(&state.context, event);
                match delay {
                    Some(delay) => schedule(env, id.as_deref(), *delay, Delivery::Event(raised)),
                    None => state.internal.push_back(raised),
                }
            }
            Action::Send {
                target,
                event: make,
                delay,
                id,
            } => {
                let message = make(&state.context, event);
                match delay {
                    Some(delay) => {
                        let delivery = match target {
                            SendTarget::Myself => Delivery::Event(message),
                            SendTarget::Parent => Delivery::Parent(message),
                            SendTarget::Child(to) => Delivery::Forward {
                                to: to.clone(),
                                event: message,
                            },
                        };
                        schedule(env, id.as_deref(), *delay, delivery);
                    }
                    None => send(env, target, message),
                }
            }
            Action::Cancel(id) => {
                if !env.registry.cancel_timer(id) {
                    trace!(id = %id, "nothing to cancel");
                }
            }
            Action::Log { label, message } => {
                let text = message(&state.context, event);
                match label {
                    Some(label) => info!(machine = %env.machine.id(), label = %label, "{text}"),
                    None => info!(machine = %env.machine.id(), "{text}"),
                }
            }
            Action::Spawn { id, logic, input } => {
                let id = match id {
                    Some(id) => id.clone(),
                    None => {
                        let prefix = format!("{}:spawn", env.machine.id());
                        env.registry.next_id(&prefix)
                    }
                };
                let input = input
                    .as_ref()
                    .map_or(Value::Null, |input| input(&state.context, event));
                env.registry.spawn(
                    SpawnRequest {
                        id,
                        owner: Some(owner),
                        depth: env.machine.node(owner).depth(),
                        behavior: logic.create(),
                        input,
                    },
                    env.mailbox,
                    env.clock,
                );
            }
            Action::StopChild(id) => {
                if !env.registry.stop(id) {
                    trace!(actor = %id, "no such child to stop");
                }
            }
            Action::Effect { name, effect } => {
                let mut scope = ActionScope::new();
                effect(&state.context, event, &mut scope).map_err(|message| ActionError {
                    action: name.clone(),
                    message,
                })?;
                for command in scope.into_commands() {
                    match command {
                        ScopeCommand::Raise(raised) => state.internal.push_back(raised),
                        ScopeCommand::Send(target, message) => send(env, &target, message),
                    }
                }
            }
        }
    }
    Ok(())
}

fn send<C>(env: &StepEnv<'_, C>, target: &SendTarget, event: Event) {
    let delivered = match target {
        SendTarget::Myself => env.mailbox.post_local(Envelope::Event {
            origin: None,
            event,
            terminal: false,
        }),
        SendTarget::Child(to) => env.mailbox.post_local(Envelope::Forward {
            to: to.clone(),
            event,
        }),
        SendTarget::Parent => match env.parent {
            Some(parent) => parent.send(event),
            None => {
                debug!(machine = %env.machine.id(), "no parent to send to");
                false
            }
        },
    };
    if !delivered {
        trace!(machine = %env.machine.id(), ?target, "send dropped");
    }
}

fn schedule<C>(env: &mut StepEnv<'_, C>, id: Option<&str>, delay: Duration, delivery: Delivery) {
    let id = match id {
        Some(id) => id.to_string(),
        None => env.registry.next_id("delay"),
    };
    env.registry.spawn(
        SpawnRequest {
            id,
            owner: None,
            depth: 0,
            behavior: Box::new(TimerBehavior::new(delay, delivery)),
            input: Value::Null,
        },
        env.mailbox,
        env.clock,
    );
}

/// Stop every actor, then run exit actions for the whole configuration,
/// deepest first. All exit actions run even if one fails; the first error
/// is returned.
pub(crate) fn exit_all<C>(
    state: &mut StepState<C>,
    env: &mut StepEnv<'_, C>,
    event: &Event,
) -> Result<(), InterpreterError> {
    env.registry.stop_all();
    let mut first_error = None;
    let active: Vec<StateId> = state.configuration.iter().rev().collect();
    for exiting in active {
        let node = env.machine.node(exiting);
        trace!(state = %node.id(), "exit");
        if let Err(error) = execute(state, env, &node.exit, event, exiting) {
            first_error.get_or_insert(error);
        }
    }
    // exit actions may have spawned or scheduled
    env.registry.stop_all();
    state.internal.clear();
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Inbox, SimulatedClock};
    use crate::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
    use crate::core::Guard;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Ctx {
        count: u32,
        trail: Vec<String>,
    }

    fn note(label: &'static str) -> Action<Ctx> {
        Action::assign(move |c: &Ctx, _| {
            let mut next = c.clone();
            next.trail.push(label.to_string());
            next
        })
    }

    struct Harness {
        registry: Registry,
        mailbox: Mailbox,
        inbox: Inbox,
        clock: Arc<dyn Clock>,
    }

    impl Harness {
        fn new() -> Self {
            let (mailbox, inbox) = Mailbox::channel();
            Self {
                registry: Registry::new(),
                mailbox,
                inbox,
                clock: Arc::new(SimulatedClock::new()),
            }
        }

        fn env<'a>(&'a mut self, machine: &'a Machine<Ctx>) -> StepEnv<'a, Ctx> {
            StepEnv {
                machine,
                registry: &mut self.registry,
                mailbox: &self.mailbox,
                clock: &self.clock,
                parent: None,
                max_microsteps: DEFAULT_MAX_MICROSTEPS,
                conflicts: Vec::new(),
            }
        }
    }

    fn started(machine: &Machine<Ctx>, harness: &mut Harness) -> StepState<Ctx> {
        let mut state = StepState::new(machine.initial_context(&Value::Null));
        initialize(&mut state, &mut harness.env(machine), &Event::init(Value::Null)).unwrap();
        state
    }

    #[test]
    fn actions_run_exit_transition_entry() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("a")
            .state(
                StateBuilder::new("a")
                    .exit(note("exit a"))
                    .on("GO", TransitionBuilder::to("b").action(note("go"))),
            )
            .state(StateBuilder::new("b").entry(note("enter b")))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);

        macrostep(&mut state, &mut harness.env(&machine), &Event::new("GO")).unwrap();

        assert_eq!(state.context.trail, vec!["exit a", "go", "enter b"]);
    }

    #[test]
    fn assign_is_visible_to_later_actions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("a")
            .state(
                StateBuilder::new("a").on(
                    "INC",
                    TransitionBuilder::targetless()
                        .action(Action::assign(|c: &Ctx, _| Ctx {
                            count: c.count + 1,
                            ..c.clone()
                        }))
                        .action(Action::effect(move |c: &Ctx, _, _| {
                            sink.lock().unwrap().push(c.count);
                            Ok(())
                        })),
                ),
            )
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);

        macrostep(&mut state, &mut harness.env(&machine), &Event::new("INC")).unwrap();
        macrostep(&mut state, &mut harness.env(&machine), &Event::new("INC")).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn raised_events_run_in_the_same_macrostep() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("a")
            .state(StateBuilder::new("a").on(
                "GO",
                TransitionBuilder::to("b").action(Action::raise("NEXT")),
            ))
            .state(StateBuilder::new("b").on("NEXT", "c"))
            .state(StateBuilder::new("c"))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);

        let outcome = macrostep(&mut state, &mut harness.env(&machine), &Event::new("GO")).unwrap();

        assert_eq!(outcome.microsteps, 2);
        assert!(machine.state_value(&state.configuration).matches("c"));
        assert!(state.internal.is_empty());
    }

    #[test]
    fn guarded_always_settles_after_one_microstep() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("a")
            .state(
                StateBuilder::new("a").always(
                    TransitionBuilder::targetless()
                        .guard(Guard::new(|c: &Ctx, _| c.count == 0))
                        .action(Action::assign(|c: &Ctx, _| Ctx {
                            count: 1,
                            ..c.clone()
                        })),
                ),
            )
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = StepState::new(Ctx::default());

        let outcome = initialize(&mut state, &mut harness.env(&machine), &Event::init(Value::Null)).unwrap();

        assert_eq!(outcome.microsteps, 2);
        assert_eq!(state.context.count, 1);
    }

    #[test]
    fn unconditional_always_loop_hits_the_cap() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("a")
            .state(StateBuilder::new("a").always("b"))
            .state(StateBuilder::new("b").always("a"))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = StepState::new(Ctx::default());
        let mut env = harness.env(&machine);
        env.max_microsteps = 25;

        let error = initialize(&mut state, &mut env, &Event::init(Value::Null)).unwrap_err();

        assert!(matches!(
            error,
            InterpreterError::InfiniteLoop(InfiniteMicrostepLoopError { limit: 25, .. })
        ));
    }

    #[test]
    fn final_child_raises_done_state() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("job")
            .state(
                StateBuilder::new("job")
                    .initial("working")
                    .state(StateBuilder::new("working").on("FINISH", "finished"))
                    .state(
                        StateBuilder::new("finished")
                            .final_state()
                            .output(|_: &Ctx, _| serde_json::json!({ "ok": true })),
                    )
                    .on_done(TransitionBuilder::to("report").action(Action::assign(
                        |c: &Ctx, e: &Event| {
                            let mut next = c.clone();
                            next.trail.push(e.data().to_string());
                            next
                        },
                    ))),
            )
            .state(StateBuilder::new("report"))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);

        macrostep(&mut state, &mut harness.env(&machine), &Event::new("FINISH")).unwrap();

        assert!(machine.state_value(&state.configuration).matches("report"));
        assert_eq!(state.context.trail, vec![r#"{"ok":true}"#]);
        assert!(!state.done);
    }

    #[test]
    fn top_level_final_finishes_with_output() {
        let machine = MachineBuilder::new("m")
            .context(Ctx {
                count: 7,
                trail: Vec::new(),
            })
            .initial("a")
            .state(StateBuilder::new("a").on("END", "end"))
            .state(StateBuilder::new("end").final_state())
            .output(|c: &Ctx, _| serde_json::json!(c.count))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);

        macrostep(&mut state, &mut harness.env(&machine), &Event::new("END")).unwrap();

        assert!(state.done);
        assert_eq!(state.output, Some(serde_json::json!(7)));
    }

    #[test]
    fn exiting_owner_stops_its_invocations() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("busy")
            .state(
                StateBuilder::new("busy")
                    .invoke(crate::builder::InvokeBuilder::new(crate::actor::ActorLogic::callback(|_| Ok(()))).id("worker"))
                    .after(Duration::from_secs(5), "idle")
                    .on("CANCEL", "idle"),
            )
            .state(StateBuilder::new("idle"))
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);
        assert!(harness.registry.contains("worker"));
        assert_eq!(harness.registry.len(), 2);

        macrostep(&mut state, &mut harness.env(&machine), &Event::new("CANCEL")).unwrap();

        assert!(harness.registry.is_empty());
        assert!(harness.inbox.try_recv().is_err());
    }

    #[test]
    fn exit_all_runs_every_exit_once_and_stops_actors() {
        let machine = MachineBuilder::new("m")
            .context(Ctx::default())
            .initial("outer")
            .exit(note("exit m"))
            .state(
                StateBuilder::new("outer")
                    .initial("inner")
                    .exit(note("exit outer"))
                    .entry(Action::spawn(crate::actor::ActorLogic::callback(|_| Ok(()))).with_id("helper"))
                    .state(StateBuilder::new("inner").exit(note("exit inner"))),
            )
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let mut state = started(&machine, &mut harness);
        assert!(harness.registry.contains("helper"));

        exit_all(&mut state, &mut harness.env(&machine), &Event::new("stop")).unwrap();

        assert_eq!(state.context.trail, vec!["exit inner", "exit outer", "exit m"]);
        assert!(harness.registry.is_empty());
    }
}
