//! Time sources for delayed events and `after` transitions.

use super::ActorError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;

type Callback = Box<dyn FnOnce() + Send>;

/// Schedules callbacks after a delay.
///
/// Callbacks only post to mailboxes; they never run machine code directly.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    fn schedule(&self, delay: Duration, callback: Callback) -> Result<TimerHandle, ActorError>;
}

/// Cancels a scheduled callback when asked to.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Real time, driven by the ambient tokio runtime.
///
/// Works with `tokio::time::pause` in tests.
#[derive(Debug)]
pub struct TokioClock {
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn schedule(&self, delay: Duration, callback: Callback) -> Result<TimerHandle, ActorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ActorError::NoRuntime)?;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Ok(TimerHandle::new(move || task.abort()))
    }
}

/// Manually advanced time for deterministic tests.
///
/// # Example
///
/// ```rust
/// use harel::actor::{Clock, SimulatedClock};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = SimulatedClock::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// clock
///     .schedule(Duration::from_secs(5), Box::new(move || flag.store(true, Ordering::SeqCst)))
///     .unwrap();
///
/// clock.advance(Duration::from_secs(4));
/// assert!(!fired.load(Ordering::SeqCst));
/// clock.advance(Duration::from_secs(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SimulatedClock {
    inner: Arc<Mutex<Timeline>>,
}

#[derive(Default)]
struct Timeline {
    now: Duration,
    next: u64,
    pending: BTreeMap<(Duration, u64), Callback>,
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeline")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn lock(timeline: &Mutex<Timeline>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward, firing due callbacks in deadline order.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.inner).now + by;
        loop {
            let due = {
                let mut timeline = lock(&self.inner);
                match timeline.pending.first_key_value() {
                    Some((key, _)) if key.0 <= target => {
                        let key = *key;
                        timeline.now = key.0;
                        timeline.pending.remove(&key)
                    }
                    _ => None,
                }
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
        lock(&self.inner).now = target;
    }

    /// Number of callbacks still waiting.
    pub fn pending(&self) -> usize {
        lock(&self.inner).pending.len()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        lock(&self.inner).now
    }

    fn schedule(&self, delay: Duration, callback: Callback) -> Result<TimerHandle, ActorError> {
        let key = {
            let mut timeline = lock(&self.inner);
            let key = (timeline.now + delay, timeline.next);
            timeline.next += 1;
            timeline.pending.insert(key, callback);
            key
        };
        let timeline: Weak<Mutex<Timeline>> = Arc::downgrade(&self.inner);
        Ok(TimerHandle::new(move || {
            if let Some(timeline) = timeline.upgrade() {
                lock(&timeline).pending.remove(&key);
            }
        }))
    }
}
