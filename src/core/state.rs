//! State nodes of a machine definition.
//!
//! Nodes live in a flat arena owned by [`Machine`](super::Machine). A
//! [`StateId`] is the node's index in that arena; indices are assigned by a
//! pre-order walk of the definition, so comparing ids compares document
//! order and every ancestor has a smaller id than its descendants.

use crate::actor::InvokeDef;
use crate::effects::{Action, TransitionDef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

/// Extended state carried by an interpreter.
///
/// Context values are replaced wholesale by assign actions, never mutated
/// in place, so they only need to be cheap enough to clone once per
/// macrostep.
///
/// # Example
///
/// ```rust
/// use harel::core::Context;
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter {
///     count: u32,
/// }
///
/// fn assert_context<C: Context>() {}
/// assert_context::<Counter>();
/// ```
pub trait Context: Clone + Debug + Send + Sync + 'static {}

impl<T> Context for T where T: Clone + Debug + Send + Sync + 'static {}

/// Index of a state node in document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the node in document order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Whether a history node remembers direct children or leaf states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryKind {
    Shallow,
    Deep,
}

/// The closed set of node kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound { initial: StateId },
    Parallel,
    Final,
    History { kind: HistoryKind, default: Vec<StateId> },
}

pub(crate) type OutputFn<C> = Arc<dyn Fn(&C, &crate::core::Event) -> Value + Send + Sync>;

/// One node of the state tree.
pub struct StateNode<C> {
    pub(crate) index: StateId,
    pub(crate) key: String,
    pub(crate) id: String,
    pub(crate) path: Vec<String>,
    pub(crate) kind: StateKind,
    pub(crate) parent: Option<StateId>,
    pub(crate) children: Vec<StateId>,
    pub(crate) depth: usize,
    pub(crate) transitions: Vec<TransitionDef<C>>,
    pub(crate) entry: Vec<Action<C>>,
    pub(crate) exit: Vec<Action<C>>,
    pub(crate) invokes: Vec<InvokeDef<C>>,
    pub(crate) after: Vec<(Duration, String)>,
    pub(crate) output: Option<OutputFn<C>>,
    pub(crate) tags: Vec<String>,
    pub(crate) description: Option<String>,
}

impl<C> StateNode<C> {
    pub fn index(&self) -> StateId {
        self.index
    }

    /// Key of the node inside its parent.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Machine-unique id (custom, or the dotted path from the root).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keys from the root (exclusive) down to this node.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// Children in document order.
    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn transitions(&self) -> &[TransitionDef<C>] {
        &self.transitions
    }

    pub fn entry_actions(&self) -> &[Action<C>] {
        &self.entry
    }

    pub fn exit_actions(&self) -> &[Action<C>] {
        &self.exit
    }

    pub fn invokes(&self) -> &[InvokeDef<C>] {
        &self.invokes
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Atomic and final nodes are the leaves of a configuration.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, StateKind::Compound { .. })
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, StateKind::Parallel)
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, StateKind::History { .. })
    }
}

impl<C> Debug for StateNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
