//! Turns a builder tree into a validated [`Machine`].
//!
//! Compilation runs in three passes over the flattened tree: assign ids in
//! document order, decide node kinds, then resolve transition targets and
//! invocations. Every problem is collected; nothing stops at the first one.

use super::error::{DefinitionError, DefinitionErrors};
use super::state::{KindSpec, StateBuilder, Trigger};
use super::{InvokeBuilder, TransitionBuilder};
use crate::actor::InvokeDef;
use crate::core::{
    descend, lookup, ContextFactory, Event, EventDescriptor, Machine, StateId, StateKind, StateNode,
};
use crate::effects::{Candidate, TransitionDef};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<DefinitionError>>;

/// The parts of a builder that can only be resolved once every id is known.
struct Deferred<C> {
    kind: KindSpec,
    initial: Option<String>,
    history_target: Option<String>,
    transitions: Vec<(Trigger, TransitionBuilder<C>)>,
    after: Vec<(Duration, TransitionBuilder<C>)>,
    invokes: Vec<InvokeBuilder<C>>,
}

struct Compiler<C> {
    nodes: Vec<StateNode<C>>,
    ids: HashMap<String, StateId>,
    deferred: Vec<Deferred<C>>,
    checks: Vec<Check>,
}

pub(crate) fn compile<C>(
    root: StateBuilder<C>,
    context: Option<ContextFactory<C>>,
) -> Result<Machine<C>, DefinitionErrors> {
    let mut compiler = Compiler {
        nodes: Vec::new(),
        ids: HashMap::new(),
        deferred: Vec::new(),
        checks: Vec::new(),
    };
    if context.is_none() {
        compiler.fail(DefinitionError::MissingContext);
    }

    compiler.flatten(root, None);
    compiler.resolve_kinds();
    compiler.resolve_transitions();

    let Compiler {
        nodes, ids, checks, ..
    } = compiler;
    let id = nodes
        .first()
        .map(|root| root.id.clone())
        .unwrap_or_default();

    match (Validation::all_vec(checks).map(|_| ()), context) {
        (Validation::Success(()), Some(context)) => Ok(Machine {
            id,
            nodes,
            ids,
            context,
        }),
        (Validation::Failure(errors), _) => {
            Err(DefinitionErrors(errors.iter().cloned().collect()))
        }
        (Validation::Success(()), None) => {
            Err(DefinitionErrors(vec![DefinitionError::MissingContext]))
        }
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('.') && !key.contains('#')
}

impl<C> Compiler<C> {
    fn fail(&mut self, error: DefinitionError) {
        self.checks.push(Validation::fail(error));
    }

    /// Push `builder` and its subtree in pre-order.
    fn flatten(&mut self, builder: StateBuilder<C>, parent: Option<StateId>) -> StateId {
        let StateBuilder {
            key,
            id,
            kind,
            initial,
            history_target,
            children,
            transitions,
            after,
            entry,
            exit,
            invokes,
            output,
            tags,
            description,
        } = builder;
        let index = StateId(self.nodes.len());

        let (id, path, depth) = match parent {
            None => (id.unwrap_or_else(|| key.clone()), Vec::new(), 0),
            Some(parent) => {
                let parent_node = &self.nodes[parent.0];
                let parent_id = parent_node.id.clone();
                let mut path = parent_node.path.clone();
                path.push(key.clone());
                let depth = parent_node.depth + 1;
                if !valid_key(&key) {
                    self.fail(DefinitionError::InvalidKey {
                        parent: parent_id.clone(),
                        key: key.clone(),
                    });
                }
                (
                    id.unwrap_or_else(|| format!("{parent_id}.{key}")),
                    path,
                    depth,
                )
            }
        };

        if self.ids.insert(id.clone(), index).is_some() {
            self.fail(DefinitionError::DuplicateId(id.clone()));
        }

        self.nodes.push(StateNode {
            index,
            key,
            id,
            path,
            kind: StateKind::Atomic,
            parent,
            children: Vec::new(),
            depth,
            transitions: Vec::new(),
            entry,
            exit,
            invokes: Vec::new(),
            after: Vec::new(),
            output,
            tags,
            description,
        });
        self.deferred.push(Deferred {
            kind,
            initial,
            history_target,
            transitions,
            after,
            invokes,
        });

        let mut keys = HashSet::new();
        for child in children {
            if !keys.insert(child.key.clone()) {
                self.fail(DefinitionError::DuplicateKey {
                    parent: self.nodes[index.0].id.clone(),
                    key: child.key.clone(),
                });
            }
            let child = self.flatten(child, Some(index));
            self.nodes[index.0].children.push(child);
        }
        index
    }

    /// Parents precede children, so a history node always sees its
    /// parent's final kind.
    fn resolve_kinds(&mut self) {
        for index in 0..self.nodes.len() {
            let mut errors = Vec::new();
            let kind = self.kind_of(StateId(index), &mut errors);
            self.nodes[index].kind = kind;
            for error in errors {
                self.fail(error);
            }
        }
    }

    fn kind_of(&self, state: StateId, errors: &mut Vec<DefinitionError>) -> StateKind {
        let node = &self.nodes[state.0];
        let spec = &self.deferred[state.0];
        let has_children = !node.children.is_empty();

        match spec.kind {
            KindSpec::Final => {
                if has_children {
                    errors.push(DefinitionError::UnexpectedChildren {
                        state: node.id.clone(),
                        kind: "final",
                    });
                }
                StateKind::Final
            }
            KindSpec::History(kind) => {
                if has_children {
                    errors.push(DefinitionError::UnexpectedChildren {
                        state: node.id.clone(),
                        kind: "history",
                    });
                }
                StateKind::History {
                    kind,
                    default: self.history_default(state, errors),
                }
            }
            KindSpec::Parallel => {
                if !has_children {
                    errors.push(DefinitionError::EmptyParallel(node.id.clone()));
                }
                if let Some(initial) = &spec.initial {
                    errors.push(DefinitionError::InvalidInitial {
                        state: node.id.clone(),
                        initial: initial.clone(),
                    });
                }
                StateKind::Parallel
            }
            KindSpec::Auto if !has_children => {
                if let Some(initial) = &spec.initial {
                    errors.push(DefinitionError::InvalidInitial {
                        state: node.id.clone(),
                        initial: initial.clone(),
                    });
                }
                StateKind::Atomic
            }
            KindSpec::Auto => match self.initial_child(state, errors) {
                Some(initial) => StateKind::Compound { initial },
                None => StateKind::Atomic,
            },
        }
    }

    fn is_history_spec(&self, state: StateId) -> bool {
        matches!(self.deferred[state.0].kind, KindSpec::History(_))
    }

    fn initial_child(
        &self,
        state: StateId,
        errors: &mut Vec<DefinitionError>,
    ) -> Option<StateId> {
        let node = &self.nodes[state.0];
        let mut regular = node
            .children
            .iter()
            .copied()
            .filter(|child| !self.is_history_spec(*child));

        match &self.deferred[state.0].initial {
            Some(key) => {
                let found = regular.find(|child| self.nodes[child.0].key == *key);
                if found.is_none() {
                    errors.push(DefinitionError::InvalidInitial {
                        state: node.id.clone(),
                        initial: key.clone(),
                    });
                }
                found
            }
            None => {
                let first = regular.next();
                if first.is_none() {
                    errors.push(DefinitionError::MissingInitial(node.id.clone()));
                }
                first
            }
        }
    }

    fn history_default(
        &self,
        state: StateId,
        errors: &mut Vec<DefinitionError>,
    ) -> Vec<StateId> {
        let node = &self.nodes[state.0];
        let Some(parent) = node.parent else {
            return Vec::new();
        };

        if let Some(target) = &self.deferred[state.0].history_target {
            return match self.resolve_target(state, target) {
                Some(found)
                    if found != state
                        && !self.is_history_spec(found)
                        && self.is_inside(found, parent) =>
                {
                    vec![found]
                }
                Some(_) => {
                    errors.push(DefinitionError::InvalidHistoryDefault {
                        state: node.id.clone(),
                        target: target.clone(),
                    });
                    Vec::new()
                }
                None => {
                    errors.push(DefinitionError::UnknownTarget {
                        from: node.id.clone(),
                        target: target.clone(),
                    });
                    Vec::new()
                }
            };
        }

        let parent_node = &self.nodes[parent.0];
        match parent_node.kind {
            StateKind::Compound { initial } => vec![initial],
            StateKind::Parallel => parent_node
                .children
                .iter()
                .copied()
                .filter(|child| !self.is_history_spec(*child))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_inside(&self, state: StateId, ancestor: StateId) -> bool {
        let mut current = self.nodes[state.0].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent.0].parent;
        }
        false
    }

    /// Whether two targets can be active at once: one contains the other,
    /// or they meet below a parallel state.
    fn coexist(&self, a: StateId, b: StateId) -> bool {
        if a == b || self.is_inside(a, b) || self.is_inside(b, a) {
            return true;
        }
        let mut current = self.nodes[a.0].parent;
        while let Some(ancestor) = current {
            if self.is_inside(b, ancestor) {
                return self.nodes[ancestor.0].is_parallel();
            }
            current = self.nodes[ancestor.0].parent;
        }
        false
    }

    fn resolve_target(&self, source: StateId, target: &str) -> Option<StateId> {
        if target.starts_with('#') {
            return lookup(&self.nodes, &self.ids, target);
        }
        if let Some(path) = target.strip_prefix('.') {
            return descend(&self.nodes, source, path.split('.'));
        }
        let base = self.nodes[source.0].parent.unwrap_or(source);
        descend(&self.nodes, base, target.split('.'))
    }

    fn resolve_transitions(&mut self) {
        let mut invoke_ids = HashSet::new();

        for index in 0..self.nodes.len() {
            let state = StateId(index);
            let transitions = mem::take(&mut self.deferred[index].transitions);
            let after = mem::take(&mut self.deferred[index].after);
            let invokes = mem::take(&mut self.deferred[index].invokes);
            let source_id = self.nodes[index].id.clone();

            if self.nodes[index].is_final() && !(transitions.is_empty() && after.is_empty()) {
                self.fail(DefinitionError::FinalWithTransitions(source_id.clone()));
            }

            let mut defs = Vec::new();
            for (trigger, builder) in transitions {
                let descriptor = match trigger {
                    Trigger::Event(text) => match EventDescriptor::parse(&text) {
                        Some(descriptor) => descriptor,
                        None => {
                            self.fail(DefinitionError::InvalidDescriptor {
                                state: source_id.clone(),
                                descriptor: text,
                            });
                            continue;
                        }
                    },
                    Trigger::Always => EventDescriptor::Always,
                    Trigger::Done => exact(Event::done_state(&source_id, Value::Null)),
                };
                self.add(&mut defs, state, descriptor, builder);
            }

            let mut delays: Vec<(Duration, String)> = Vec::new();
            for (delay, builder) in after {
                let event_type = Event::after_type(delay, &source_id);
                if !delays.iter().any(|(known, _)| *known == delay) {
                    delays.push((delay, event_type.clone()));
                }
                self.add(&mut defs, state, EventDescriptor::Exact(event_type), builder);
            }

            let mut invoke_defs = Vec::new();
            for (n, invoke) in invokes.into_iter().enumerate() {
                let InvokeBuilder {
                    logic,
                    id,
                    input,
                    on_done,
                    on_error,
                } = invoke;
                let id = id.unwrap_or_else(|| format!("{source_id}:invocation[{n}]"));
                if !invoke_ids.insert(id.clone()) {
                    self.fail(DefinitionError::DuplicateInvokeId(id.clone()));
                }
                for builder in on_done {
                    let descriptor = exact(Event::done_actor(&id, Value::Null));
                    self.add(&mut defs, state, descriptor, builder);
                }
                for builder in on_error {
                    let descriptor = exact(Event::error_actor(&id, ""));
                    self.add(&mut defs, state, descriptor, builder);
                }
                invoke_defs.push(InvokeDef { id, logic, input });
            }

            let node = &mut self.nodes[index];
            node.transitions = defs;
            node.after = delays;
            node.invokes = invoke_defs;
        }
    }

    /// Candidates sharing a descriptor are grouped in declaration order.
    fn add(
        &mut self,
        defs: &mut Vec<TransitionDef<C>>,
        source: StateId,
        descriptor: EventDescriptor,
        builder: TransitionBuilder<C>,
    ) {
        let candidate = self.candidate(source, builder);
        match defs.iter_mut().find(|def| def.descriptor == descriptor) {
            Some(def) => def.candidates.push(candidate),
            None => defs.push(TransitionDef {
                source,
                descriptor,
                candidates: vec![candidate],
            }),
        }
    }

    fn candidate(&mut self, source: StateId, builder: TransitionBuilder<C>) -> Candidate<C> {
        let TransitionBuilder {
            targets,
            guard,
            actions,
            reenter,
        } = builder;
        let source_id = self.nodes[source.0].id.clone();

        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            match self.resolve_target(source, &target) {
                Some(state) => resolved.push(state),
                None => self.fail(DefinitionError::UnknownTarget {
                    from: source_id.clone(),
                    target,
                }),
            }
        }

        for (n, first) in resolved.iter().enumerate() {
            if let Some(second) = resolved[n + 1..]
                .iter()
                .find(|second| !self.coexist(*first, **second))
            {
                self.fail(DefinitionError::ConflictingTargets {
                    from: source_id.clone(),
                    targets: (
                        self.nodes[first.0].id.clone(),
                        self.nodes[second.0].id.clone(),
                    ),
                });
            }
        }

        let unknown: Vec<String> = guard
            .iter()
            .flat_map(|guard| guard.state_refs())
            .filter(|reference| lookup(&self.nodes, &self.ids, reference).is_none())
            .map(str::to_string)
            .collect();
        for reference in unknown {
            self.fail(DefinitionError::UnknownGuardState {
                state: source_id.clone(),
                reference,
            });
        }

        Candidate {
            guard,
            targets: resolved,
            actions,
            reenter,
        }
    }
}

fn exact(event: Event) -> EventDescriptor {
    EventDescriptor::Exact(event.event_type().to_string())
}
