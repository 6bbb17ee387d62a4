//! The interpreter: a running instance of a [`Machine`].
//!
//! An interpreter owns the current snapshot, a FIFO mailbox and the
//! registry of the actors it spawned. Events are processed one macrostep at
//! a time; anything sent while a macrostep runs (by actions, child actors or
//! other tasks) is queued behind it.
//!
//! ```rust
//! use harel::builder::{MachineBuilder, StateBuilder};
//! use harel::interpreter::{Interpreter, Status};
//!
//! let machine = MachineBuilder::new("light")
//!     .context(())
//!     .initial("red")
//!     .state(StateBuilder::new("red").on("TIMER", "green"))
//!     .state(StateBuilder::new("green").on("TIMER", "yellow"))
//!     .state(StateBuilder::new("yellow").on("TIMER", "red"))
//!     .build()
//!     .unwrap();
//!
//! let mut light = Interpreter::new(machine);
//! light.start().unwrap();
//! light.send("TIMER").unwrap();
//! assert!(light.snapshot().matches("green"));
//! assert_eq!(light.status(), Status::Running);
//! ```

mod error;
mod handle;
mod observer;
mod options;
mod snapshot;

pub use error::{InterpreterError, TaskError};
pub use handle::{InterpreterHandle, InterpreterTask};
pub use observer::{Diagnostic, Observer, Subscription};
pub use options::{InterpreterOptions, PreStartPolicy};
pub use snapshot::Snapshot;

use crate::actor::{ActorRef, ActorScope, ActorStatus, Delivery, Envelope, Inbox, Mailbox, Registry};
use crate::checkpoint::{Checkpoint, CheckpointError};
use crate::core::{Context, Event, Machine};
use crate::step::microstep::{self, Outcome, StepEnv, StepState};
use observer::{DiagnosticFn, Observers};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Event passed to exit actions when an interpreter is stopped.
pub const STOP_EVENT: &str = "statechart.stop";

/// Lifecycle of an interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    Running,
    Stopped,
    Done,
    Error,
}

impl Status {
    /// Stopped, done and failed interpreters accept nothing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Done | Self::Error)
    }
}

/// Cloneable sender into an interpreter's mailbox, usable from other threads
/// and tasks. Queued events are processed by the interpreter's next
/// [`flush`](Interpreter::flush), [`tick`](Interpreter::tick) or `send`.
#[derive(Clone, Debug)]
pub struct Address {
    mailbox: Mailbox,
}

impl Address {
    pub fn send(&self, event: impl Into<Event>) -> bool {
        self.mailbox.post(Envelope::Event {
            origin: None,
            event: event.into(),
            terminal: false,
        })
    }

    pub fn stop(&self) -> bool {
        self.mailbox.post(Envelope::Stop)
    }
}

/// A running statechart.
pub struct Interpreter<C: Context> {
    machine: Arc<Machine<C>>,
    options: InterpreterOptions,
    session: Uuid,
    status: Status,
    state: StepState<C>,
    snapshot: Snapshot<C>,
    registry: Registry,
    mailbox: Mailbox,
    inbox: Inbox,
    deferred: VecDeque<Event>,
    observers: Observers<C>,
    diagnostics: Vec<DiagnosticFn>,
    parent: Option<ActorScope>,
    restored: bool,
}

impl<C: Context> Interpreter<C> {
    pub fn new(machine: impl Into<Arc<Machine<C>>>) -> Self {
        Self::with_options(machine, InterpreterOptions::default())
    }

    pub fn with_options(machine: impl Into<Arc<Machine<C>>>, options: InterpreterOptions) -> Self {
        let (mailbox, inbox) = Mailbox::channel();
        Self::assemble(machine.into(), options, mailbox, inbox, None)
    }

    /// A child interpreter whose mailbox wakes the parent's.
    pub(crate) fn linked(machine: Arc<Machine<C>>, options: InterpreterOptions, scope: ActorScope) -> Self {
        let (mailbox, inbox) = Mailbox::linked(scope.parent().clone(), scope.id());
        Self::assemble(machine, options, mailbox, inbox, Some(scope))
    }

    /// Rehydrate an interpreter from a checkpoint.
    ///
    /// [`start`](Self::start) resumes in the checkpoint's configuration
    /// without running entry actions; the invocations and delayed
    /// transitions of the active states are restarted.
    pub fn restore(
        machine: impl Into<Arc<Machine<C>>>,
        checkpoint: &Checkpoint<C>,
        options: InterpreterOptions,
    ) -> Result<Self, CheckpointError> {
        let machine = machine.into();
        let (configuration, history) = checkpoint.resolve(&machine)?;
        let mut interpreter = Self::with_options(machine, options);
        interpreter.state.configuration = configuration;
        interpreter.state.context = checkpoint.context.clone();
        interpreter.state.history = history;
        interpreter.state.done = checkpoint.status == Status::Done;
        interpreter.state.output = checkpoint.output.clone();
        interpreter.restored = true;
        interpreter.refresh();
        debug!(
            machine = %interpreter.machine.id(),
            checkpoint = %checkpoint.id,
            "restored from checkpoint"
        );
        Ok(interpreter)
    }

    fn assemble(
        machine: Arc<Machine<C>>,
        options: InterpreterOptions,
        mailbox: Mailbox,
        inbox: Inbox,
        parent: Option<ActorScope>,
    ) -> Self {
        let context = machine.initial_context(&options.input);
        let state = StepState::new(context.clone());
        let snapshot = Snapshot {
            machine: Arc::clone(&machine),
            configuration: state.configuration.clone(),
            context,
            history: state.history.clone(),
            status: Status::NotStarted,
            last_event: None,
            output: None,
            error: None,
        };
        Self {
            machine,
            options,
            session: Uuid::new_v4(),
            status: Status::NotStarted,
            state,
            snapshot,
            registry: Registry::new(),
            mailbox,
            inbox,
            deferred: VecDeque::new(),
            observers: Observers::new(),
            diagnostics: Vec::new(),
            parent,
            restored: false,
        }
    }

    /// Enter the initial configuration (or resume a restored one) and
    /// process any deferred events. Calling it again does nothing.
    pub fn start(&mut self) -> Result<(), InterpreterError> {
        if self.status != Status::NotStarted {
            return Ok(());
        }
        info!(machine = %self.machine.id(), session = %self.session, id = %self.id(), "starting interpreter");
        self.status = Status::Running;
        let init = Event::init(self.options.input.clone());

        if self.restored {
            self.resume(init);
        } else {
            self.run(init, |state, env, event| microstep::initialize(state, env, event))?;
        }

        for event in std::mem::take(&mut self.deferred) {
            self.mailbox.post_local(Envelope::Event {
                origin: None,
                event,
                terminal: false,
            });
        }
        self.flush().map(|_| ())
    }

    fn resume(&mut self, init: Event) {
        if self.state.done {
            self.status = Status::Done;
            self.refresh();
            self.publish();
            self.observers.complete();
            return;
        }
        let mut env = StepEnv {
            machine: &self.machine,
            registry: &mut self.registry,
            mailbox: &self.mailbox,
            clock: &self.options.clock,
            parent: self.parent.as_ref(),
            max_microsteps: self.options.max_microsteps,
            conflicts: Vec::new(),
        };
        microstep::resume(&mut self.state, &mut env, &init);
        self.snapshot.last_event = Some(init);
        self.refresh();
        self.publish();
    }

    /// Send an event.
    ///
    /// Before `start` the event is deferred or dropped according to
    /// [`PreStartPolicy`]. Once stopped, done or failed, events are dropped.
    /// Otherwise the event is queued and the queue is drained before this
    /// returns.
    pub fn send(&mut self, event: impl Into<Event>) -> Result<(), InterpreterError> {
        let event = event.into();
        match self.status {
            Status::NotStarted => {
                match self.options.pre_start {
                    PreStartPolicy::Defer => {
                        trace!(machine = %self.machine.id(), event = %event, "deferring event until start");
                        self.deferred.push_back(event);
                    }
                    PreStartPolicy::Drop => {
                        debug!(machine = %self.machine.id(), event = %event, "interpreter not started; event dropped");
                    }
                }
                Ok(())
            }
            Status::Running => {
                self.mailbox.post_local(Envelope::Event {
                    origin: None,
                    event,
                    terminal: false,
                });
                self.flush().map(|_| ())
            }
            status => {
                debug!(machine = %self.machine.id(), event = %event, ?status, "interpreter is not running; event dropped");
                Ok(())
            }
        }
    }

    /// Process everything already queued. Returns the number of envelopes
    /// handled.
    pub fn flush(&mut self) -> Result<usize, InterpreterError> {
        if self.status == Status::NotStarted {
            return Ok(0);
        }
        let mut handled = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            if self.status.is_terminal() {
                trace!(machine = %self.machine.id(), ?envelope, "interpreter is not running; envelope dropped");
                continue;
            }
            handled += 1;
            self.dispatch(envelope)?;
        }
        Ok(handled)
    }

    /// Wait for the next envelope (from a child actor, a timer or an
    /// [`Address`]), then process the queue. Returns false if the
    /// interpreter is not running.
    pub async fn tick(&mut self) -> Result<bool, InterpreterError> {
        if self.status != Status::Running {
            self.flush()?;
            return Ok(false);
        }
        let Some(envelope) = self.inbox.recv().await else {
            return Ok(false);
        };
        self.dispatch(envelope)?;
        self.flush()?;
        Ok(true)
    }

    /// Process incoming envelopes until the snapshot satisfies `predicate`
    /// or the interpreter stops running.
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&Snapshot<C>) -> bool,
    ) -> Result<Snapshot<C>, InterpreterError> {
        loop {
            if predicate(&self.snapshot) || !self.tick().await? {
                return Ok(self.snapshot());
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<(), InterpreterError> {
        match envelope {
            Envelope::Event {
                origin,
                event,
                terminal,
            } => {
                if let Some(origin) = &origin {
                    if !self.registry.accepts(origin) {
                        trace!(actor = %origin.id, event = %event, "event from a stopped actor dropped");
                        return Ok(());
                    }
                    if terminal {
                        let status = if event.is_actor_error() {
                            ActorStatus::Error
                        } else {
                            ActorStatus::Done
                        };
                        self.registry.finish(origin, status);
                    }
                }
                self.process(event)
            }
            Envelope::Forward { to, event } => self.forward(&to, event),
            Envelope::Wake { child } => match self.registry.wake(&child) {
                Some(Err(error)) => self.child_failed(&child, error.to_string()),
                _ => Ok(()),
            },
            Envelope::TimerFired { origin, delivery } => {
                if !self.registry.finish(&origin, ActorStatus::Done) {
                    trace!(timer = %origin.id, "cancelled timer fired");
                    return Ok(());
                }
                match delivery {
                    Delivery::Event(event) => self.process(event),
                    Delivery::Forward { to, event } => self.forward(&to, event),
                    Delivery::Parent(event) => {
                        match &self.parent {
                            Some(parent) => {
                                parent.send(event);
                            }
                            None => debug!(machine = %self.machine.id(), "no parent to send to"),
                        }
                        Ok(())
                    }
                }
            }
            Envelope::Stop => self.stop(),
        }
    }

    fn forward(&mut self, to: &str, event: Event) -> Result<(), InterpreterError> {
        match self.registry.receive(to, event) {
            Some(Ok(())) => Ok(()),
            Some(Err(error)) => self.child_failed(to, error.to_string()),
            None => {
                debug!(machine = %self.machine.id(), actor = %to, "no such child; event dropped");
                Ok(())
            }
        }
    }

    /// A child rejected an event or failed while draining its queue: it is
    /// stopped and the parent sees `error.actor.<id>`.
    fn child_failed(&mut self, id: &str, message: String) -> Result<(), InterpreterError> {
        warn!(machine = %self.machine.id(), actor = %id, %message, "child actor failed");
        self.registry.fail(id);
        self.process(Event::error_actor(id, message))
    }

    fn process(&mut self, event: Event) -> Result<(), InterpreterError> {
        debug!(machine = %self.machine.id(), event = %event, "processing event");
        self.run(event, |state, env, event| microstep::macrostep(state, env, event))
    }

    /// Run one step on a scratch copy of the state and commit it only if it
    /// succeeds.
    fn run(
        &mut self,
        event: Event,
        step: impl FnOnce(&mut StepState<C>, &mut StepEnv<'_, C>, &Event) -> Result<Outcome, InterpreterError>,
    ) -> Result<(), InterpreterError> {
        let mut scratch = self.state.clone();
        let mut env = StepEnv {
            machine: &self.machine,
            registry: &mut self.registry,
            mailbox: &self.mailbox,
            clock: &self.options.clock,
            parent: self.parent.as_ref(),
            max_microsteps: self.options.max_microsteps,
            conflicts: Vec::new(),
        };
        let result = step(&mut scratch, &mut env, &event);
        let conflicts = env.conflicts;
        for conflict in conflicts {
            self.emit(&Diagnostic::TransitionConflict(conflict));
        }

        match result {
            Ok(outcome) => {
                if !outcome.handled {
                    debug!(machine = %self.machine.id(), event = %event, "event not handled");
                    let diagnostic = Diagnostic::UnhandledEvent {
                        event: event.event_type().to_string(),
                        states: self.snapshot.state_ids(),
                    };
                    self.emit(&diagnostic);
                }
                self.state = scratch;
                self.snapshot.last_event = Some(event);
                if self.state.done {
                    self.finish();
                } else {
                    self.refresh();
                    self.publish();
                }
                Ok(())
            }
            Err(failure) => {
                self.snapshot.last_event = Some(event);
                self.fail(failure.clone());
                Err(failure)
            }
        }
    }

    fn finish(&mut self) {
        info!(machine = %self.machine.id(), id = %self.id(), "reached final state");
        let event = self
            .snapshot
            .last_event
            .clone()
            .unwrap_or_else(|| Event::new(STOP_EVENT));
        let mut env = StepEnv {
            machine: &self.machine,
            registry: &mut self.registry,
            mailbox: &self.mailbox,
            clock: &self.options.clock,
            parent: self.parent.as_ref(),
            max_microsteps: self.options.max_microsteps,
            conflicts: Vec::new(),
        };
        if let Err(failure) = microstep::exit_all(&mut self.state, &mut env, &event) {
            warn!(machine = %self.machine.id(), error = %failure, "exit action failed while finishing");
        }
        self.status = Status::Done;
        self.refresh();
        self.publish();
        self.observers.complete();
    }

    fn fail(&mut self, failure: InterpreterError) {
        error!(machine = %self.machine.id(), id = %self.id(), error = %failure, "macrostep failed");
        self.registry.stop_all();
        self.status = Status::Error;
        self.refresh();
        self.snapshot.error = Some(failure.clone());
        self.publish();
        self.observers.error(&failure);
        self.observers.complete();
    }

    /// Stop every child actor and run the exit actions of the active
    /// configuration, deepest first. Calling it again does nothing.
    ///
    /// The interpreter is stopped even if an exit action fails; the first
    /// failure is returned.
    pub fn stop(&mut self) -> Result<(), InterpreterError> {
        match self.status {
            Status::Stopped | Status::Done | Status::Error => return Ok(()),
            Status::NotStarted => {
                self.deferred.clear();
                self.status = Status::Stopped;
                self.refresh();
                self.observers.complete();
                return Ok(());
            }
            Status::Running => {}
        }
        info!(machine = %self.machine.id(), id = %self.id(), "stopping interpreter");
        let event = Event::new(STOP_EVENT);
        let mut env = StepEnv {
            machine: &self.machine,
            registry: &mut self.registry,
            mailbox: &self.mailbox,
            clock: &self.options.clock,
            parent: self.parent.as_ref(),
            max_microsteps: self.options.max_microsteps,
            conflicts: Vec::new(),
        };
        let result = microstep::exit_all(&mut self.state, &mut env, &event);
        self.status = Status::Stopped;
        self.refresh();
        self.publish();
        self.observers.complete();
        result
    }

    /// Rebuild the cached snapshot from the committed state.
    fn refresh(&mut self) {
        self.snapshot = Snapshot {
            machine: Arc::clone(&self.machine),
            configuration: self.state.configuration.clone(),
            context: self.state.context.clone(),
            history: self.state.history.clone(),
            status: self.status,
            last_event: self.snapshot.last_event.take(),
            output: self.state.output.clone(),
            error: None,
        };
    }

    fn publish(&mut self) {
        self.observers.next(&self.snapshot);
    }

    fn emit(&mut self, diagnostic: &Diagnostic) {
        for listener in &mut self.diagnostics {
            listener(diagnostic);
        }
    }

    /// Register an observer; it sees every snapshot published from now on.
    pub fn subscribe(&mut self, observer: impl Observer<C> + 'static) -> Subscription {
        self.observers.subscribe(Box::new(observer))
    }

    pub fn on_diagnostic(&mut self, listener: impl FnMut(&Diagnostic) + Send + 'static) {
        self.diagnostics.push(Box::new(listener));
    }

    pub fn snapshot(&self) -> Snapshot<C> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn context(&self) -> &C {
        &self.state.context
    }

    pub fn output(&self) -> Option<&Value> {
        self.state.output.as_ref()
    }

    /// Instance id: the configured one, else the machine id.
    pub fn id(&self) -> &str {
        self.options.id.as_deref().unwrap_or_else(|| self.machine.id())
    }

    /// Unique per interpreter instance.
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn machine(&self) -> &Arc<Machine<C>> {
        &self.machine
    }

    pub fn address(&self) -> Address {
        Address {
            mailbox: self.mailbox.clone(),
        }
    }

    /// Live child actors, excluding internal timers.
    pub fn children(&self) -> Vec<ActorRef> {
        self.registry.children()
    }

    pub fn child(&self, id: &str) -> Option<ActorRef> {
        self.registry.get(id).cloned()
    }

    /// Snapshot of a child actor that exposes one.
    pub fn child_snapshot(&self, id: &str) -> Option<Value> {
        self.registry.snapshot(id)
    }

    /// Move the interpreter into a tokio task.
    ///
    /// The task starts the interpreter if needed and processes its mailbox
    /// until it stops, finishes or fails. Must be called within a tokio
    /// runtime.
    pub fn spawn(mut self) -> (InterpreterHandle<C>, InterpreterTask<C>) {
        let (publisher, snapshots) = watch::channel(self.snapshot());
        let handle = InterpreterHandle {
            mailbox: self.mailbox.clone(),
            snapshots,
        };
        let join = tokio::spawn(async move {
            self.subscribe(move |snapshot: &Snapshot<C>| {
                publisher.send_replace(snapshot.clone());
            });
            self.start()?;
            while !self.status.is_terminal() {
                if !self.tick().await? {
                    break;
                }
            }
            Ok(self.snapshot())
        });
        (handle, InterpreterTask { join })
    }
}

impl<C: Context> fmt::Debug for Interpreter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("machine", &self.machine.id())
            .field("id", &self.id())
            .field("session", &self.session)
            .field("status", &self.status)
            .field("configuration", &self.snapshot.state_ids())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
    use crate::effects::Action;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Counter {
        count: i64,
        exits: u32,
    }

    fn counter() -> Machine<Counter> {
        MachineBuilder::new("counter")
            .context(Counter::default())
            .initial("active")
            .state(
                StateBuilder::new("active")
                    .exit(Action::assign(|c: &Counter, _| Counter {
                        exits: c.exits + 1,
                        ..c.clone()
                    }))
                    .on(
                        "INC",
                        TransitionBuilder::targetless().action(Action::assign(|c: &Counter, _| Counter {
                            count: c.count + 1,
                            ..c.clone()
                        })),
                    )
                    .on(
                        "BOOM",
                        TransitionBuilder::targetless()
                            .action(Action::try_assign(|_: &Counter, _| Err("boom".to_string())).named("explode")),
                    )
                    .on("FINISH", "finished"),
            )
            .state(StateBuilder::new("finished").final_state())
            .build()
            .unwrap()
    }

    #[test]
    fn start_is_idempotent() {
        let mut interpreter = Interpreter::new(counter());
        interpreter.start().unwrap();
        interpreter.send("INC").unwrap();
        interpreter.start().unwrap();

        assert_eq!(interpreter.context().count, 1);
        assert!(interpreter.snapshot().matches("active"));
    }

    #[test]
    fn deferred_events_replay_on_start() {
        let mut interpreter = Interpreter::new(counter());
        interpreter.send("INC").unwrap();
        interpreter.send("INC").unwrap();
        assert_eq!(interpreter.context().count, 0);

        interpreter.start().unwrap();

        assert_eq!(interpreter.context().count, 2);
    }

    #[test]
    fn drop_policy_discards_early_events() {
        let options = InterpreterOptions::default().with_pre_start(PreStartPolicy::Drop);
        let mut interpreter = Interpreter::with_options(counter(), options);
        interpreter.send("INC").unwrap();
        interpreter.start().unwrap();

        assert_eq!(interpreter.context().count, 0);
    }

    #[test]
    fn stop_twice_exits_once() {
        let mut interpreter = Interpreter::new(counter());
        interpreter.start().unwrap();

        interpreter.stop().unwrap();
        interpreter.stop().unwrap();
        interpreter.send("INC").unwrap();

        assert_eq!(interpreter.status(), Status::Stopped);
        assert_eq!(interpreter.context().exits, 1);
        assert_eq!(interpreter.context().count, 0);
    }

    #[test]
    fn action_failure_is_fatal_and_keeps_last_state() {
        let mut interpreter = Interpreter::new(counter());
        interpreter.start().unwrap();
        interpreter.send("INC").unwrap();

        let error = interpreter.send("BOOM").unwrap_err();

        assert_eq!(
            error,
            InterpreterError::Action(crate::effects::ActionError {
                action: "explode".to_string(),
                message: "boom".to_string(),
            })
        );
        let snapshot = interpreter.snapshot();
        assert_eq!(snapshot.status(), Status::Error);
        assert_eq!(snapshot.context().count, 1);
        assert!(snapshot.matches("active"));
        assert_eq!(snapshot.error(), Some(&error));
        interpreter.send("INC").unwrap();
        assert_eq!(interpreter.context().count, 1);
    }

    #[test]
    fn reaching_final_state_completes_observers() {
        let events = Arc::new(Mutex::new(Vec::new()));

        struct Recorder(Arc<Mutex<Vec<String>>>);
        impl Observer<Counter> for Recorder {
            fn next(&mut self, snapshot: &Snapshot<Counter>) {
                self.0.lock().unwrap().push(format!("{:?}", snapshot.status()));
            }
            fn complete(&mut self) {
                self.0.lock().unwrap().push("complete".to_string());
            }
        }

        let mut interpreter = Interpreter::new(counter());
        interpreter.subscribe(Recorder(Arc::clone(&events)));
        interpreter.start().unwrap();
        interpreter.send("FINISH").unwrap();
        interpreter.send("INC").unwrap();

        assert_eq!(interpreter.status(), Status::Done);
        assert!(interpreter.snapshot().matches("finished"));
        assert_eq!(interpreter.context().exits, 1);
        assert_eq!(*events.lock().unwrap(), vec!["Running", "Done", "complete"]);
    }

    #[test]
    fn unhandled_events_are_published_and_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let mut interpreter = Interpreter::new(counter());
        let sink = Arc::clone(&seen);
        interpreter.subscribe(move |snapshot: &Snapshot<Counter>| {
            let event = snapshot.last_event().map(|e| e.event_type().to_string());
            sink.lock().unwrap().push(event);
        });
        let reports = Arc::clone(&diagnostics);
        interpreter.on_diagnostic(move |diagnostic| reports.lock().unwrap().push(diagnostic.clone()));

        interpreter.start().unwrap();
        interpreter.send("NOPE").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(crate::core::INIT_EVENT.to_string()), Some("NOPE".to_string())]
        );
        assert_eq!(
            *diagnostics.lock().unwrap(),
            vec![Diagnostic::UnhandledEvent {
                event: "NOPE".to_string(),
                states: vec!["counter".to_string(), "counter.active".to_string()],
            }]
        );
    }

    #[test]
    fn unsubscribing_inside_a_callback_does_not_skip_others() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut interpreter = Interpreter::new(counter());

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let own = Arc::clone(&slot);
        let log = Arc::clone(&calls);
        let first = interpreter.subscribe(move |_: &Snapshot<Counter>| {
            log.lock().unwrap().push("first");
            if let Some(subscription) = own.lock().unwrap().as_ref() {
                subscription.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(first);
        let log = Arc::clone(&calls);
        interpreter.subscribe(move |_: &Snapshot<Counter>| log.lock().unwrap().push("second"));

        interpreter.start().unwrap();
        interpreter.send("INC").unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "second"]);
    }

    #[test]
    fn address_queues_until_flushed() {
        let mut interpreter = Interpreter::new(counter());
        interpreter.start().unwrap();
        let address = interpreter.address();

        assert!(address.send("INC"));
        assert_eq!(interpreter.context().count, 0);
        assert_eq!(interpreter.flush().unwrap(), 1);
        assert_eq!(interpreter.context().count, 1);
    }

    #[test]
    fn restore_resumes_without_entry_actions() {
        let machine = Arc::new(
            MachineBuilder::new("door")
                .context(Counter::default())
                .initial("closed")
                .state(
                    StateBuilder::new("closed")
                        .entry(Action::assign(|c: &Counter, _| Counter {
                            count: c.count + 100,
                            ..c.clone()
                        }))
                        .on("OPEN", "open"),
                )
                .state(StateBuilder::new("open").on("CLOSE", "closed"))
                .build()
                .unwrap(),
        );
        let mut first = Interpreter::new(Arc::clone(&machine));
        first.start().unwrap();
        first.send("OPEN").unwrap();
        let checkpoint = first.snapshot().checkpoint();

        let mut second =
            Interpreter::restore(Arc::clone(&machine), &checkpoint, InterpreterOptions::default()).unwrap();
        second.start().unwrap();

        assert!(second.snapshot().matches("open"));
        assert_eq!(second.context().count, 100);
        second.send("CLOSE").unwrap();
        assert_eq!(second.context().count, 200);
    }

    #[tokio::test]
    async fn spawned_interpreter_runs_until_stopped() {
        let (handle, task) = Interpreter::new(counter()).spawn();

        handle.send("INC");
        handle.send("INC");
        let snapshot = handle
            .wait_for(|snapshot| snapshot.context().count == 2)
            .await
            .unwrap();
        assert!(snapshot.matches("active"));

        handle.stop();
        let last = task.await.unwrap();
        assert_eq!(last.status(), Status::Stopped);
        assert_eq!(last.context().exits, 1);
    }
}
