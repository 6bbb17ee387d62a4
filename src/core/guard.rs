//! Guard predicates for controlling transitions.
//!
//! Guards are pure functions of the context and the triggering event. They
//! decide whether a transition candidate is eligible; they never change
//! anything. Guards compose with [`Guard::and`], [`Guard::or`] and
//! [`Guard::not`], and [`Guard::in_state`] tests configuration membership.

use super::configuration::Configuration;
use super::event::Event;
use super::machine::Machine;
use crate::effects::GuardError;
use std::fmt;
use std::sync::Arc;

type PredicateFn<C> = dyn Fn(&C, &Event) -> Result<bool, String> + Send + Sync;

/// Everything a guard may look at.
pub struct GuardArgs<'a, C> {
    pub context: &'a C,
    pub event: &'a Event,
    pub(crate) machine: &'a Machine<C>,
    pub(crate) configuration: &'a Configuration,
}

/// Pure predicate that determines if a transition candidate is enabled.
///
/// # Example
///
/// ```rust
/// use harel::core::Guard;
///
/// #[derive(Clone, Debug)]
/// struct Account {
///     balance: i64,
/// }
///
/// let solvent = Guard::new(|account: &Account, _event| account.balance >= 0).named("solvent");
/// let overdrawn = Guard::not(solvent.clone());
/// assert_eq!(overdrawn.name(), "not(solvent)");
/// ```
pub struct Guard<C> {
    kind: GuardKind<C>,
    name: Option<String>,
}

enum GuardKind<C> {
    Predicate(Arc<PredicateFn<C>>),
    InState(String),
    Not(Box<Guard<C>>),
    And(Vec<Guard<C>>),
    Or(Vec<Guard<C>>),
}

impl<C> Guard<C> {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        Self::fallible(move |context, event| Ok(predicate(context, event)))
    }

    /// Create a guard whose predicate can fail; the error aborts the
    /// macrostep that evaluated it.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            kind: GuardKind::Predicate(Arc::new(predicate)),
            name: None,
        }
    }

    /// Passes while the state with the given id (`"#id"` or `"id"`) is active.
    pub fn in_state(id: impl Into<String>) -> Self {
        Self {
            kind: GuardKind::InState(id.into()),
            name: None,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(guard: Guard<C>) -> Self {
        Self {
            kind: GuardKind::Not(Box::new(guard)),
            name: None,
        }
    }

    pub fn and(guards: impl IntoIterator<Item = Guard<C>>) -> Self {
        Self {
            kind: GuardKind::And(guards.into_iter().collect()),
            name: None,
        }
    }

    pub fn or(guards: impl IntoIterator<Item = Guard<C>>) -> Self {
        Self {
            kind: GuardKind::Or(guards.into_iter().collect()),
            name: None,
        }
    }

    /// Attach a name used in diagnostics and errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            GuardKind::Predicate(_) => "guard".to_string(),
            GuardKind::InState(id) => format!("in({id})"),
            GuardKind::Not(inner) => format!("not({})", inner.name()),
            GuardKind::And(guards) => format!("and({})", join_names(guards)),
            GuardKind::Or(guards) => format!("or({})", join_names(guards)),
        }
    }

    /// State ids referenced by `in_state` guards, for build-time checks.
    pub(crate) fn state_refs(&self) -> Vec<&str> {
        match &self.kind {
            GuardKind::Predicate(_) => Vec::new(),
            GuardKind::InState(id) => vec![id.as_str()],
            GuardKind::Not(inner) => inner.state_refs(),
            GuardKind::And(guards) | GuardKind::Or(guards) => {
                guards.iter().flat_map(|g| g.state_refs()).collect()
            }
        }
    }

    /// Evaluate the guard.
    pub fn check(&self, args: &GuardArgs<'_, C>) -> Result<bool, GuardError> {
        match &self.kind {
            GuardKind::Predicate(predicate) => {
                predicate(args.context, args.event).map_err(|message| GuardError {
                    guard: self.name(),
                    event: args.event.event_type.clone(),
                    message,
                })
            }
            GuardKind::InState(id) => match args.machine.get(id) {
                Some(state) => Ok(args.configuration.contains(state)),
                None => Err(GuardError {
                    guard: self.name(),
                    event: args.event.event_type.clone(),
                    message: format!("unknown state '{id}'"),
                }),
            },
            GuardKind::Not(inner) => Ok(!inner.check(args)?),
            GuardKind::And(guards) => {
                for guard in guards {
                    if !guard.check(args)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            GuardKind::Or(guards) => {
                for guard in guards {
                    if guard.check(args)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn join_names<C>(guards: &[Guard<C>]) -> String {
    guards
        .iter()
        .map(|g| g.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            GuardKind::Predicate(predicate) => GuardKind::Predicate(Arc::clone(predicate)),
            GuardKind::InState(id) => GuardKind::InState(id.clone()),
            GuardKind::Not(inner) => GuardKind::Not(inner.clone()),
            GuardKind::And(guards) => GuardKind::And(guards.clone()),
            GuardKind::Or(guards) => GuardKind::Or(guards.clone()),
        };
        Self {
            kind,
            name: self.name.clone(),
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder};

    #[derive(Clone, Debug)]
    struct Tank {
        level: u32,
    }

    fn machine() -> Machine<Tank> {
        MachineBuilder::new("tank")
            .context(Tank { level: 3 })
            .initial("filling")
            .state(StateBuilder::new("filling"))
            .state(StateBuilder::new("draining"))
            .build()
            .unwrap()
    }

    fn check(guard: &Guard<Tank>, tank: &Tank) -> Result<bool, GuardError> {
        let machine = machine();
        let configuration = machine.initial_configuration();
        let event = Event::new("TICK");
        guard.check(&GuardArgs {
            context: tank,
            event: &event,
            machine: &machine,
            configuration: &configuration,
        })
    }

    #[test]
    fn guard_reads_context() {
        let full = Guard::new(|tank: &Tank, _| tank.level >= 10);

        assert!(!check(&full, &Tank { level: 3 }).unwrap());
        assert!(check(&full, &Tank { level: 12 }).unwrap());
    }

    #[test]
    fn guard_is_deterministic() {
        let guard = Guard::new(|tank: &Tank, _| tank.level % 2 == 1);
        let tank = Tank { level: 7 };

        assert_eq!(check(&guard, &tank).unwrap(), check(&guard, &tank).unwrap());
    }

    #[test]
    fn combinators_compose() {
        let low = Guard::new(|tank: &Tank, _| tank.level < 5).named("low");
        let empty = Guard::new(|tank: &Tank, _| tank.level == 0).named("empty");
        let tank = Tank { level: 3 };

        assert!(check(&Guard::and([low.clone(), Guard::not(empty.clone())]), &tank).unwrap());
        assert!(check(&Guard::or([empty.clone(), low.clone()]), &tank).unwrap());
        assert!(!check(&Guard::and([low, empty]), &tank).unwrap());
    }

    #[test]
    fn in_state_checks_configuration() {
        let tank = Tank { level: 0 };

        assert!(check(&Guard::in_state("#tank.filling"), &tank).unwrap());
        assert!(!check(&Guard::in_state("tank.draining"), &tank).unwrap());
    }

    #[test]
    fn failing_predicate_reports_guard_name() {
        let guard = Guard::fallible(|_: &Tank, _| Err("sensor offline".to_string())).named("sensor");

        let error = check(&guard, &Tank { level: 1 }).unwrap_err();
        assert_eq!(error.guard, "sensor");
        assert_eq!(error.message, "sensor offline");
    }

    #[test]
    fn generated_names_describe_structure() {
        let guard: Guard<Tank> = Guard::or([Guard::in_state("#a"), Guard::not(Guard::in_state("#b"))]);
        assert_eq!(guard.name(), "or(in(#a), not(in(#b)))");
        assert_eq!(guard.state_refs(), vec!["#a", "#b"]);
    }
}
