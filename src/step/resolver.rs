//! Transition resolution.
//!
//! Everything in this module is a pure function of the machine, the current
//! configuration, the history records and the context. Nothing is executed:
//! the microstep engine consumes these results.
//!
//! Selection walks from every active leaf up through its ancestors; the
//! first state with an enabled transition wins for that leaf, shadowing its
//! ancestors. Inside one state, exact descriptors beat partial wildcards,
//! longer wildcard stems beat shorter ones and `*` comes last; declaration
//! order breaks ties. Transitions whose exit sets overlap conflict, and the
//! one selected later is discarded.

use super::error::TransitionConflictError;
use crate::core::{
    Configuration, Event, GuardArgs, HistoryKind, HistoryRecords, Machine, StateId, StateKind,
};
use crate::effects::{Action, GuardError, TransitionRef};
use std::collections::BTreeSet;
use std::iter;

/// Transitions chosen for one microstep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Selection {
    pub transitions: Vec<TransitionRef>,
    pub conflicts: Vec<TransitionConflictError>,
}

/// Select the enabled, non-conflicting transitions for `event`, or the
/// eventless ones when `eventless` is set (guards still see `event`).
pub(crate) fn select_transitions<C>(
    machine: &Machine<C>,
    configuration: &Configuration,
    history: &HistoryRecords,
    context: &C,
    event: &Event,
    eventless: bool,
) -> Result<Selection, GuardError> {
    let args = GuardArgs {
        context,
        event,
        machine,
        configuration,
    };

    let mut enabled: Vec<TransitionRef> = Vec::new();
    for leaf in machine.leaves(configuration) {
        for state in iter::once(leaf).chain(machine.ancestors(leaf)) {
            if let Some(transition) = first_enabled(machine, state, &args, eventless)? {
                if !enabled.contains(&transition) {
                    enabled.push(transition);
                }
                break;
            }
        }
    }

    Ok(remove_conflicts(machine, configuration, history, enabled, event))
}

fn first_enabled<C>(
    machine: &Machine<C>,
    state: StateId,
    args: &GuardArgs<'_, C>,
    eventless: bool,
) -> Result<Option<TransitionRef>, GuardError> {
    let node = machine.node(state);
    let mut matching: Vec<((u8, usize), usize)> = node
        .transitions
        .iter()
        .enumerate()
        .filter(|(_, transition)| {
            if eventless {
                transition.descriptor.is_always()
            } else {
                transition.descriptor.matches(&args.event.event_type)
            }
        })
        .map(|(index, transition)| (transition.descriptor.rank(), index))
        .collect();
    matching.sort();

    for (_, index) in matching {
        for (position, candidate) in node.transitions[index].candidates.iter().enumerate() {
            let passes = match &candidate.guard {
                Some(guard) => guard.check(args)?,
                None => true,
            };
            if passes {
                return Ok(Some(TransitionRef {
                    source: state,
                    transition: index,
                    candidate: position,
                }));
            }
        }
    }
    Ok(None)
}

fn remove_conflicts<C>(
    machine: &Machine<C>,
    configuration: &Configuration,
    history: &HistoryRecords,
    enabled: Vec<TransitionRef>,
    event: &Event,
) -> Selection {
    let mut kept: Vec<(TransitionRef, BTreeSet<StateId>)> = Vec::new();
    let mut conflicts = Vec::new();

    for transition in enabled {
        let exits = exit_set_of(machine, configuration, history, transition);
        let winner = kept
            .iter()
            .find(|(_, other)| !other.is_disjoint(&exits))
            .map(|(winner, _)| *winner);
        match winner {
            Some(winner) => conflicts.push(TransitionConflictError {
                event: event.event_type.clone(),
                kept: machine.node(winner.source).id.clone(),
                discarded: machine.node(transition.source).id.clone(),
            }),
            None => kept.push((transition, exits)),
        }
    }

    Selection {
        transitions: kept.into_iter().map(|(transition, _)| transition).collect(),
        conflicts,
    }
}

/// Targets with history nodes replaced by what they restore.
pub(crate) fn effective_targets<C>(
    machine: &Machine<C>,
    history: &HistoryRecords,
    targets: &[StateId],
) -> BTreeSet<StateId> {
    let mut resolved = BTreeSet::new();
    for &target in targets {
        match &machine.node(target).kind {
            StateKind::History { default, .. } => match history.get(target) {
                Some(recorded) => resolved.extend(recorded.iter().copied()),
                None => resolved.extend(effective_targets(machine, history, default)),
            },
            _ => {
                resolved.insert(target);
            }
        }
    }
    resolved
}

/// The state whose active descendants a transition exits.
///
/// A transition that stays inside its source (and does not ask to re-enter
/// it) is scoped to the source. Otherwise the domain is the least common
/// compound ancestor of the source and every target, falling back to the
/// root.
pub(crate) fn transition_domain<C>(
    machine: &Machine<C>,
    history: &HistoryRecords,
    transition: TransitionRef,
) -> StateId {
    let candidate = machine.candidate(transition);
    let source = transition.source;
    let targets = effective_targets(machine, history, &candidate.targets);

    let internal = targets
        .iter()
        .all(|target| *target == source || machine.is_descendant(*target, source));
    if !candidate.reenter && internal {
        return source;
    }

    let states: Vec<StateId> = iter::once(source).chain(targets).collect();
    least_common_compound_ancestor(machine, &states)
}

fn least_common_compound_ancestor<C>(machine: &Machine<C>, states: &[StateId]) -> StateId {
    let root = machine.root();
    let Some((&head, tail)) = states.split_first() else {
        return root;
    };
    machine
        .ancestors(head)
        .find(|&ancestor| {
            (ancestor == root || machine.node(ancestor).is_compound())
                && tail
                    .iter()
                    .all(|&state| machine.is_descendant(state, ancestor))
        })
        .unwrap_or(root)
}

fn exit_set_of<C>(
    machine: &Machine<C>,
    configuration: &Configuration,
    history: &HistoryRecords,
    transition: TransitionRef,
) -> BTreeSet<StateId> {
    if machine.candidate(transition).targets.is_empty() {
        return BTreeSet::new();
    }
    let domain = transition_domain(machine, history, transition);
    configuration
        .iter()
        .filter(|state| machine.is_descendant(*state, domain))
        .collect()
}

/// States exited by a set of transitions, in exit order (reverse document
/// order, deepest first).
pub(crate) fn exit_set<C>(
    machine: &Machine<C>,
    configuration: &Configuration,
    history: &HistoryRecords,
    transitions: &[TransitionRef],
) -> Vec<StateId> {
    let mut states = BTreeSet::new();
    for transition in transitions {
        states.extend(exit_set_of(machine, configuration, history, *transition));
    }
    states.into_iter().rev().collect()
}

/// History recorded for the states about to be exited.
///
/// Deep history remembers the active leaves below its parent, shallow
/// history the parent's active children.
pub(crate) fn record_history<C>(
    machine: &Machine<C>,
    configuration: &Configuration,
    history: &HistoryRecords,
    exiting: &[StateId],
) -> HistoryRecords {
    let mut records = history.clone();
    for &state in exiting {
        for &child in &machine.node(state).children {
            let StateKind::History { kind, .. } = machine.node(child).kind else {
                continue;
            };
            let remembered: Vec<StateId> = match kind {
                HistoryKind::Deep => configuration
                    .iter()
                    .filter(|active| {
                        machine.node(*active).is_leaf() && machine.is_descendant(*active, state)
                    })
                    .collect(),
                HistoryKind::Shallow => configuration
                    .iter()
                    .filter(|active| machine.node(*active).parent == Some(state))
                    .collect(),
            };
            records = records.record(child, remembered);
        }
    }
    records
}

/// States entered by a set of transitions, in entry order.
pub(crate) fn entry_set<C>(
    machine: &Machine<C>,
    history: &HistoryRecords,
    transitions: &[TransitionRef],
) -> Vec<StateId> {
    let mut planner = EntryPlanner::new(machine, history);
    for &transition in transitions {
        let candidate = machine.candidate(transition);
        if candidate.targets.is_empty() {
            continue;
        }
        let domain = transition_domain(machine, history, transition);

        for &target in &candidate.targets {
            let reentered =
                transition.source != target || transition.source != domain || candidate.reenter;
            if !machine.node(target).is_history() && reentered {
                planner.states.insert(target);
            }
            planner.add_descendants(target);
        }

        for target in effective_targets(machine, history, &candidate.targets) {
            let ancestors: Vec<StateId> = machine
                .ancestors(target)
                .take_while(|ancestor| *ancestor != domain)
                .collect();
            planner.add_ancestors(&ancestors, Some(domain));
        }
    }
    planner.states.into_iter().collect()
}

/// States entered when the machine starts: the root and its default
/// descendants.
pub(crate) fn initial_entry_set<C>(machine: &Machine<C>) -> Vec<StateId> {
    let history = HistoryRecords::new();
    let mut planner = EntryPlanner::new(machine, &history);
    planner.states.insert(machine.root());
    planner.add_descendants(machine.root());
    planner.states.into_iter().collect()
}

/// Accumulates the states to enter, filling in initial children, parallel
/// regions and history.
struct EntryPlanner<'m, C> {
    machine: &'m Machine<C>,
    history: &'m HistoryRecords,
    states: BTreeSet<StateId>,
}

impl<'m, C> EntryPlanner<'m, C> {
    fn new(machine: &'m Machine<C>, history: &'m HistoryRecords) -> Self {
        Self {
            machine,
            history,
            states: BTreeSet::new(),
        }
    }

    fn add_descendants(&mut self, state: StateId) {
        let machine = self.machine;
        let node = machine.node(state);
        match &node.kind {
            StateKind::History { default, .. } => {
                let restored: Vec<StateId> = match self.history.get(state) {
                    Some(recorded) => recorded.to_vec(),
                    None => default.clone(),
                };
                for &target in &restored {
                    if !machine.node(target).is_history() {
                        self.states.insert(target);
                    }
                    self.add_descendants(target);
                }
                if let Some(parent) = node.parent {
                    for &target in &restored {
                        self.add_proper_ancestors(target, parent);
                    }
                }
            }
            StateKind::Compound { initial } => {
                let initial = *initial;
                if !machine.node(initial).is_history() {
                    self.states.insert(initial);
                }
                self.add_descendants(initial);
                self.add_proper_ancestors(initial, state);
            }
            StateKind::Parallel => self.fill_regions(state),
            StateKind::Atomic | StateKind::Final => {}
        }
    }

    fn add_proper_ancestors(&mut self, state: StateId, until: StateId) {
        let ancestors: Vec<StateId> = self
            .machine
            .ancestors(state)
            .take_while(|ancestor| *ancestor != until)
            .collect();
        self.add_ancestors(&ancestors, None);
    }

    fn add_ancestors(&mut self, ancestors: &[StateId], domain: Option<StateId>) {
        for &ancestor in ancestors {
            let inside = domain.map_or(true, |domain| self.machine.is_descendant(ancestor, domain));
            if inside {
                self.states.insert(ancestor);
            }
            if self.machine.node(ancestor).is_parallel() {
                self.fill_regions(ancestor);
            }
        }
    }

    /// Enter every region of a parallel node that nothing entered yet.
    fn fill_regions(&mut self, parallel: StateId) {
        let machine = self.machine;
        for &region in &machine.node(parallel).children {
            if machine.node(region).is_history() {
                continue;
            }
            let covered = self
                .states
                .iter()
                .any(|state| *state == region || machine.is_descendant(*state, region));
            if !covered {
                self.states.insert(region);
                self.add_descendants(region);
            }
        }
    }
}

/// The outcome of one microstep, computed without executing anything.
#[derive(Debug)]
pub struct Resolution<'m, C> {
    /// Selected transitions after conflict removal.
    pub transitions: Vec<TransitionRef>,
    /// States to exit, deepest first.
    pub exit_set: Vec<StateId>,
    /// States to enter, shallowest first.
    pub entry_set: Vec<StateId>,
    /// Configuration after the microstep.
    pub configuration: Configuration,
    /// History after recording the exited regions.
    pub history: HistoryRecords,
    /// Exit actions, transition actions and entry actions, in execution
    /// order.
    pub actions: Vec<&'m Action<C>>,
    pub conflicts: Vec<TransitionConflictError>,
}

impl<'m, C> Resolution<'m, C> {
    /// True when no transition was enabled.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl<C> Machine<C> {
    /// Configuration the machine starts in.
    pub fn initial_configuration(&self) -> Configuration {
        initial_entry_set(self).into_iter().collect()
    }

    /// Resolve a single microstep for `event` without running anything.
    ///
    /// Eventless transitions that would follow are not included; guards see
    /// `context` as given, before any assign of this step.
    pub fn resolve(
        &self,
        configuration: &Configuration,
        history: &HistoryRecords,
        context: &C,
        event: &Event,
    ) -> Result<Resolution<'_, C>, GuardError> {
        let selection =
            select_transitions(self, configuration, history, context, event, false)?;
        let transitions = selection.transitions;

        let exits = exit_set(self, configuration, history, &transitions);
        let history = record_history(self, configuration, history, &exits);
        let entries = entry_set(self, &history, &transitions);

        let mut next = configuration.clone();
        for state in &exits {
            next.remove(*state);
        }
        for state in &entries {
            next.insert(*state);
        }

        let mut actions: Vec<&Action<C>> = Vec::new();
        for state in &exits {
            actions.extend(self.node(*state).exit.iter());
        }
        for transition in &transitions {
            actions.extend(self.candidate(*transition).actions.iter());
        }
        for state in &entries {
            actions.extend(self.node(*state).entry.iter());
        }

        Ok(Resolution {
            transitions,
            exit_set: exits,
            entry_set: entries,
            configuration: next,
            history,
            actions,
            conflicts: selection.conflicts,
        })
    }
}
