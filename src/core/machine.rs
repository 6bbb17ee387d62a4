//! The immutable machine definition: a validated tree of state nodes.

use super::configuration::Configuration;
use super::state::{StateId, StateKind, StateNode};
use super::value::StateValue;
use crate::effects::{Candidate, TransitionRef};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub(crate) type ContextFactory<C> = Arc<dyn Fn(&Value) -> C + Send + Sync>;

/// A statechart definition.
///
/// Built once by [`MachineBuilder`](crate::builder::MachineBuilder) and never
/// modified afterwards; interpreters share it behind an `Arc`.
pub struct Machine<C> {
    pub(crate) id: String,
    pub(crate) nodes: Vec<StateNode<C>>,
    pub(crate) ids: HashMap<String, StateId>,
    pub(crate) context: ContextFactory<C>,
}

impl<C> Machine<C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> StateId {
        StateId(0)
    }

    /// Access a node by index.
    ///
    /// Indices are only handed out by this machine, so they are always in
    /// range for it.
    pub fn node(&self, state: StateId) -> &StateNode<C> {
        &self.nodes[state.0]
    }

    /// All nodes in document order.
    pub fn nodes(&self) -> &[StateNode<C>] {
        &self.nodes
    }

    /// Resolve `"#id"`, `"id"` or `"#id.child.grandchild"` to a node.
    pub fn get(&self, reference: &str) -> Option<StateId> {
        lookup(&self.nodes, &self.ids, reference)
    }

    /// Initial context for the given input.
    pub fn initial_context(&self, input: &Value) -> C {
        (self.context)(input)
    }

    pub fn parent(&self, state: StateId) -> Option<StateId> {
        self.node(state).parent
    }

    /// Proper ancestors of `state`, nearest first.
    pub fn ancestors(&self, state: StateId) -> Ancestors<'_, C> {
        Ancestors {
            machine: self,
            next: self.parent(state),
        }
    }

    /// True when `state` lies strictly inside `ancestor`.
    pub fn is_descendant(&self, state: StateId, ancestor: StateId) -> bool {
        // ancestors always precede descendants in document order
        state > ancestor && self.ancestors(state).any(|a| a == ancestor)
    }

    pub(crate) fn candidate(&self, transition: TransitionRef) -> &Candidate<C> {
        &self.node(transition.source).transitions[transition.transition].candidates
            [transition.candidate]
    }

    /// Active leaf states in document order.
    pub fn leaves(&self, configuration: &Configuration) -> Vec<StateId> {
        configuration
            .iter()
            .filter(|state| self.node(*state).is_leaf())
            .collect()
    }

    /// Whether `state` has completed within `configuration`.
    pub fn in_final_state(&self, configuration: &Configuration, state: StateId) -> bool {
        let node = self.node(state);
        match node.kind {
            StateKind::Compound { .. } => node
                .children
                .iter()
                .any(|child| configuration.contains(*child) && self.node(*child).is_final()),
            StateKind::Parallel => self
                .regions(state)
                .all(|region| self.in_final_state(configuration, region)),
            StateKind::Final => true,
            StateKind::Atomic | StateKind::History { .. } => false,
        }
    }

    /// Children of `state` that can be active, skipping history pseudo-states.
    pub fn regions(&self, state: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.node(state)
            .children
            .iter()
            .copied()
            .filter(|child| !self.node(*child).is_history())
    }

    /// Tags of every active node.
    pub fn tags(&self, configuration: &Configuration) -> BTreeSet<String> {
        configuration
            .iter()
            .flat_map(|state| self.node(state).tags.iter().cloned())
            .collect()
    }

    /// Nested key view of a configuration, rooted below the machine node.
    pub fn state_value(&self, configuration: &Configuration) -> StateValue {
        self.value_of(configuration, self.root())
    }

    fn value_of(&self, configuration: &Configuration, state: StateId) -> StateValue {
        let node = self.node(state);
        let active: Vec<StateId> = node
            .children
            .iter()
            .copied()
            .filter(|child| configuration.contains(*child))
            .collect();

        if node.is_parallel() {
            let regions = active
                .iter()
                .map(|region| {
                    let value = if self.node(*region).is_leaf() {
                        StateValue::Branch(BTreeMap::new())
                    } else {
                        self.value_of(configuration, *region)
                    };
                    (self.node(*region).key.clone(), value)
                })
                .collect();
            return StateValue::Branch(regions);
        }

        match active.as_slice() {
            [child] if self.node(*child).is_leaf() => {
                StateValue::Leaf(self.node(*child).key.clone())
            }
            [child] => StateValue::Branch(BTreeMap::from([(
                self.node(*child).key.clone(),
                self.value_of(configuration, *child),
            )])),
            _ => StateValue::Branch(BTreeMap::new()),
        }
    }

    /// Check the structural invariants of a configuration: the root is
    /// active, every active node's parent is active, compound nodes have
    /// exactly one active child, parallel nodes have all children active,
    /// and history pseudo-states are never active.
    pub fn validate_configuration(&self, configuration: &Configuration) -> Result<(), String> {
        if !configuration.contains(self.root()) {
            return Err("root state is not active".to_string());
        }
        for state in configuration.iter() {
            if state.0 >= self.nodes.len() {
                return Err(format!("state index {} is out of range", state.0));
            }
            let node = self.node(state);
            if let Some(parent) = node.parent {
                if !configuration.contains(parent) {
                    return Err(format!("'{}' is active without its parent", node.id));
                }
            }
            let active_children = self
                .regions(state)
                .filter(|child| configuration.contains(*child))
                .count();
            match node.kind {
                StateKind::Compound { .. } if active_children != 1 => {
                    return Err(format!(
                        "compound state '{}' has {active_children} active children",
                        node.id
                    ));
                }
                StateKind::Parallel if active_children != self.regions(state).count() => {
                    return Err(format!(
                        "parallel state '{}' has inactive regions",
                        node.id
                    ));
                }
                StateKind::History { .. } => {
                    return Err(format!("history state '{}' cannot be active", node.id));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub(crate) fn lookup<C>(
    nodes: &[StateNode<C>],
    ids: &HashMap<String, StateId>,
    reference: &str,
) -> Option<StateId> {
    let id = reference.strip_prefix('#').unwrap_or(reference);
    if let Some(state) = ids.get(id) {
        return Some(*state);
    }
    let mut end = id.len();
    while let Some(dot) = id[..end].rfind('.') {
        if let Some(base) = ids.get(&id[..dot]) {
            return descend(nodes, *base, id[dot + 1..].split('.'));
        }
        end = dot;
    }
    None
}

pub(crate) fn descend<'k, C>(
    nodes: &[StateNode<C>],
    from: StateId,
    keys: impl IntoIterator<Item = &'k str>,
) -> Option<StateId> {
    let mut current = from;
    for key in keys {
        current = nodes[current.0]
            .children
            .iter()
            .copied()
            .find(|child| nodes[child.0].key == key)?;
    }
    Some(current)
}

impl<C> fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .finish()
    }
}

/// Iterator over proper ancestors, nearest first.
pub struct Ancestors<'m, C> {
    machine: &'m Machine<C>,
    next: Option<StateId>,
}

impl<C> Iterator for Ancestors<'_, C> {
    type Item = StateId;

    fn next(&mut self) -> Option<StateId> {
        let current = self.next?;
        self.next = self.machine.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{MachineBuilder, StateBuilder};
    use crate::core::{Configuration, HistoryKind, Machine, StateValue};

    fn editor() -> Machine<()> {
        MachineBuilder::new("editor")
            .context(())
            .initial("open")
            .state(
                StateBuilder::new("open")
                    .parallel()
                    .state(
                        StateBuilder::new("bold")
                            .initial("off")
                            .state(StateBuilder::new("off"))
                            .state(StateBuilder::new("on")),
                    )
                    .state(
                        StateBuilder::new("list")
                            .initial("none")
                            .state(StateBuilder::new("none"))
                            .state(StateBuilder::new("bullets"))
                            .state(StateBuilder::history("last", HistoryKind::Shallow)),
                    ),
            )
            .state(StateBuilder::new("closed").final_state())
            .build()
            .unwrap()
    }

    #[test]
    fn ids_follow_document_order() {
        let machine = editor();
        let ids: Vec<&str> = machine.nodes().iter().map(|n| n.id()).collect();

        assert_eq!(
            ids,
            vec![
                "editor",
                "editor.open",
                "editor.open.bold",
                "editor.open.bold.off",
                "editor.open.bold.on",
                "editor.open.list",
                "editor.open.list.none",
                "editor.open.list.bullets",
                "editor.open.list.last",
                "editor.closed",
            ]
        );
    }

    #[test]
    fn get_resolves_ids_and_paths() {
        let machine = editor();
        let bold_on = machine.get("#editor.open.bold.on").unwrap();

        assert_eq!(machine.get("editor.open.bold.on"), Some(bold_on));
        assert_eq!(machine.node(bold_on).key(), "on");
        assert_eq!(machine.get("#editor.missing"), None);
    }

    #[test]
    fn ancestry_queries() {
        let machine = editor();
        let on = machine.get("#editor.open.bold.on").unwrap();
        let open = machine.get("#editor.open").unwrap();
        let closed = machine.get("#editor.closed").unwrap();

        let ancestors: Vec<_> = machine.ancestors(on).collect();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[1], open);
        assert!(machine.is_descendant(on, open));
        assert!(!machine.is_descendant(open, on));
        assert!(!machine.is_descendant(closed, open));
        assert!(!machine.is_descendant(open, open));
    }

    #[test]
    fn initial_configuration_fills_every_region() {
        let machine = editor();
        let configuration = machine.initial_configuration();

        assert!(machine.validate_configuration(&configuration).is_ok());
        assert!(machine.state_value(&configuration).matches("open.bold.off"));
        assert!(machine.state_value(&configuration).matches("open.list.none"));
    }

    #[test]
    fn validate_configuration_rejects_broken_sets() {
        let machine = editor();
        let root = machine.root();
        let open = machine.get("#editor.open").unwrap();
        let bold = machine.get("#editor.open.bold").unwrap();
        let off = machine.get("#editor.open.bold.off").unwrap();
        let on = machine.get("#editor.open.bold.on").unwrap();

        let missing_region: Configuration = [root, open, bold, off].into_iter().collect();
        assert!(machine.validate_configuration(&missing_region).is_err());

        let mut two_children = machine.initial_configuration();
        two_children.insert(on);
        assert!(machine.validate_configuration(&two_children).is_err());

        let orphan: Configuration = [root, off].into_iter().collect();
        assert!(machine.validate_configuration(&orphan).is_err());
    }

    #[test]
    fn state_value_renders_leaf_children_as_keys() {
        let machine = editor();
        let root = machine.root();
        let closed = machine.get("#editor.closed").unwrap();
        let configuration: Configuration = [root, closed].into_iter().collect();

        assert_eq!(
            machine.state_value(&configuration),
            StateValue::Leaf("closed".to_string())
        );
        assert!(machine.in_final_state(&configuration, root));
    }

    fn panes() -> Machine<()> {
        MachineBuilder::new("panes")
            .context(())
            .initial("split")
            .state(
                StateBuilder::new("split")
                    .parallel()
                    .state(
                        StateBuilder::new("left")
                            .state(StateBuilder::new("editing"))
                            .state(StateBuilder::new("saved").final_state()),
                    )
                    .state(
                        StateBuilder::new("right")
                            .state(StateBuilder::new("preview"))
                            .state(StateBuilder::new("closed").final_state()),
                    )
                    .state(StateBuilder::history("recent", HistoryKind::Deep)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn history_children_are_not_regions() {
        let machine = panes();
        let split = machine.get("#panes.split").unwrap();
        let regions: Vec<&str> = machine.regions(split).map(|r| machine.node(r).key()).collect();

        assert_eq!(regions, vec!["left", "right"]);
        assert!(machine
            .validate_configuration(&machine.initial_configuration())
            .is_ok());
    }

    #[test]
    fn parallel_with_history_child_completes_when_regions_do() {
        let machine = panes();
        let split = machine.get("#panes.split").unwrap();
        let configuration: Configuration = [
            "#panes",
            "#panes.split",
            "#panes.split.left",
            "#panes.split.left.saved",
            "#panes.split.right",
            "#panes.split.right.closed",
        ]
        .into_iter()
        .map(|id| machine.get(id).unwrap())
        .collect();

        assert!(machine.validate_configuration(&configuration).is_ok());
        assert!(machine.in_final_state(&configuration, split));
        assert!(!machine.in_final_state(&machine.initial_configuration(), split));
    }

}
