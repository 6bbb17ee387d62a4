//! Harel: statecharts with an actor runtime
//!
//! Harel interprets hierarchical state machines in the style of SCXML and
//! xstate. A definition is built once, validated and frozen; interpreters
//! then run it one event at a time with run-to-completion semantics.
//!
//! # Core Concepts
//!
//! - **Machine**: an immutable tree of atomic, compound, parallel, final and
//!   history states, built with [`MachineBuilder`](builder::MachineBuilder)
//! - **Step**: pure transition selection plus a microstep loop that applies
//!   exits, transition actions and entries in document order
//! - **Interpreter**: a running instance with a mailbox, observers, delayed
//!   events and child actors
//! - **Actors**: promises, callbacks, streams and nested machines, invoked
//!   by states and stopped when those states exit
//! - **Checkpoints**: serializable snapshots that restore a paused machine
//!
//! # Example
//!
//! ```rust
//! use harel::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
//! use harel::effects::Action;
//! use harel::interpreter::Interpreter;
//!
//! #[derive(Clone, Debug)]
//! struct Door {
//!     opened: u32,
//! }
//!
//! let machine = MachineBuilder::new("door")
//!     .context(Door { opened: 0 })
//!     .initial("closed")
//!     .state(StateBuilder::new("closed").on(
//!         "OPEN",
//!         TransitionBuilder::to("open")
//!             .action(Action::assign(|door: &Door, _| Door { opened: door.opened + 1 })),
//!     ))
//!     .state(StateBuilder::new("open").on("CLOSE", "closed"))
//!     .build()
//!     .unwrap();
//!
//! let mut door = Interpreter::new(machine);
//! door.start().unwrap();
//! door.send("OPEN").unwrap();
//! door.send("CLOSE").unwrap();
//! door.send("OPEN").unwrap();
//!
//! assert!(door.snapshot().matches("open"));
//! assert_eq!(door.context().opened, 2);
//! ```

pub mod actor;
pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod effects;
pub mod interpreter;
pub mod step;

// Re-export commonly used types
pub use builder::{MachineBuilder, StateBuilder, TransitionBuilder};
pub use core::{Event, Guard, Machine, StateValue};
pub use effects::Action;
pub use interpreter::{Interpreter, Snapshot, Status};
