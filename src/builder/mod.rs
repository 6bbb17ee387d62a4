//! Fluent builders for machine definitions.
//!
//! Builders describe the state tree with plain strings for keys and targets.
//! [`MachineBuilder::build`] assigns ids, resolves every reference and
//! reports all definition problems at once as [`DefinitionErrors`].

mod compile;
mod error;
mod invoke;
mod machine;
mod state;
mod transition;

pub use error::{DefinitionError, DefinitionErrors};
pub use invoke::InvokeBuilder;
pub use machine::MachineBuilder;
pub use state::StateBuilder;
pub use transition::TransitionBuilder;
