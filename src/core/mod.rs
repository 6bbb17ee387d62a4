//! Core statechart types.
//!
//! This module contains the pure, immutable part of the library:
//! - Events and the descriptors transitions listen for
//! - The state node tree (`Machine`, `StateNode`, `StateKind`)
//! - Guard predicates and their combinators
//! - Configurations, state values and history records
//!
//! Nothing here performs side effects. Executing a step lives in
//! [`step`](crate::step); running it over time lives in
//! [`interpreter`](crate::interpreter).

mod configuration;
mod event;
mod guard;
mod history;
mod machine;
mod state;
mod value;

pub use configuration::Configuration;
pub use event::{Event, EventDescriptor, INIT_EVENT, WILDCARD};
pub use guard::{Guard, GuardArgs};
pub use history::HistoryRecords;
pub use machine::{Ancestors, Machine};
pub use state::{Context, HistoryKind, StateId, StateKind, StateNode};
pub use value::StateValue;

pub(crate) use machine::{descend, lookup, ContextFactory};
pub(crate) use state::OutputFn;
