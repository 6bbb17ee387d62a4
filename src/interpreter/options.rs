use crate::actor::{Clock, TokioClock};
use crate::step::DEFAULT_MAX_MICROSTEPS;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// What happens to events sent before [`start`](super::Interpreter::start).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreStartPolicy {
    /// Keep them and process them, in order, right after start.
    #[default]
    Defer,
    /// Discard them.
    Drop,
}

/// Runtime knobs for one interpreter instance.
///
/// # Example
///
/// ```rust
/// use harel::actor::SimulatedClock;
/// use harel::interpreter::{InterpreterOptions, PreStartPolicy};
/// use serde_json::json;
///
/// let options = InterpreterOptions::default()
///     .with_id("checkout-42")
///     .with_input(json!({ "items": 3 }))
///     .with_clock(SimulatedClock::new())
///     .with_max_microsteps(64)
///     .with_pre_start(PreStartPolicy::Drop);
/// assert_eq!(options.id(), Some("checkout-42"));
/// ```
#[derive(Clone, Debug)]
pub struct InterpreterOptions {
    pub(crate) id: Option<String>,
    pub(crate) input: Value,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) max_microsteps: usize,
    pub(crate) pre_start: PreStartPolicy,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            id: None,
            input: Value::Null,
            clock: Arc::new(TokioClock::new()),
            max_microsteps: DEFAULT_MAX_MICROSTEPS,
            pre_start: PreStartPolicy::default(),
        }
    }
}

impl InterpreterOptions {
    /// Instance id; defaults to the machine id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Input handed to the context factory and the init event.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_microsteps(mut self, limit: usize) -> Self {
        self.max_microsteps = limit;
        self
    }

    pub fn with_pre_start(mut self, policy: PreStartPolicy) -> Self {
        self.pre_start = policy;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn max_microsteps(&self) -> usize {
        self.max_microsteps
    }

    pub fn pre_start(&self) -> PreStartPolicy {
        self.pre_start
    }
}
