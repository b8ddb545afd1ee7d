//! Throttle-with-cancel facade over timer slots and call collections.
//!
//! A [`RequestQueue`] resolves free-text names through its registry, then
//! mutates the matching timer slot and call collection under one lock. Timer
//! callbacks and sweeps run later through the injected scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::calls::{CallCollection, CallId, CallSnapshot, Outcome, Settlement, Target, Transport};
use crate::config::{delay_or, QueueConfig};
use crate::error::QueueError;
use crate::names::{CollectionName, NameRegistry, TimerName};
use crate::scheduler::{Scheduler, Task, TokioScheduler};
use crate::timers::TimerBank;

/// A freshly enqueued call: its id and the future that observes its outcome.
#[derive(Debug)]
pub struct Enqueued<T> {
    pub id: CallId,
    pub settlement: Settlement<T>,
}

/// Throttled, cancel-previous request queue.
///
/// Owns the name registry, one timer slot per registered timer and one call
/// collection per registered collection. Every operation keyed on a name that
/// does not resolve is a no-op.
///
/// Cloning yields another handle to the same queue.
pub struct RequestQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        RequestQueue {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<T> {
    /// Instance name for logging
    name: String,
    registry: NameRegistry,
    scheduler: Arc<dyn Scheduler>,
    default_delay: Duration,
    sweep_delay: Duration,
    state: Mutex<State<T>>,
}

struct State<T> {
    timers: TimerBank,
    calls: HashMap<CollectionName, CallCollection<T>>,
}

impl<T> Shared<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        // User callbacks never run under this lock, so a poisoned guard still holds consistent data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    /// Build a queue whose delays are driven by `scheduler`.
    pub fn new(config: QueueConfig, scheduler: Arc<dyn Scheduler>) -> Result<Self, QueueError> {
        let registry = NameRegistry::new(&config.timers, config.collection_roots())?;
        let calls = registry
            .collections()
            .map(|name| (name.clone(), CallCollection::new(name.clone())))
            .collect();

        log::info!(
            "Request queue '{}' created with {} timer(s) and {} call collection(s)",
            config.name,
            registry.timers().count(),
            registry.collections().count()
        );

        Ok(RequestQueue {
            shared: Arc::new(Shared {
                name: config.name,
                registry,
                scheduler,
                default_delay: config.default_delay,
                sweep_delay: config.sweep_delay,
                state: Mutex::new(State {
                    timers: TimerBank::new(),
                    calls,
                }),
            }),
        })
    }

    /// Build a queue on the current Tokio runtime.
    ///
    /// Cancelling `cancel_token` stops every timer and sweep that has not fired yet.
    pub fn with_tokio(config: QueueConfig, cancel_token: CancellationToken) -> Result<Self, QueueError> {
        let scheduler = TokioScheduler::new(cancel_token)?;
        Self::new(config, Arc::new(scheduler))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.shared.registry
    }

    pub fn timer_name(&self, name: &str) -> Option<TimerName> {
        self.shared.registry.timer(name)
    }

    pub fn collection_name(&self, name: &str) -> Option<CollectionName> {
        self.shared.registry.collection(name)
    }

    /// Register a new pending call at the end of a collection.
    pub fn enqueue(&self, collection: &str) -> Option<Enqueued<T>> {
        let name = self.resolve_collection(collection, "enqueue")?;
        let now = self.shared.scheduler.now();
        let mut state = self.shared.state();
        let (id, settlement) = state.calls.get_mut(&name)?.enqueue(now);
        log::debug!("Request queue '{}': enqueued call {} in '{}'", self.shared.name, id, name);
        Some(Enqueued { id, settlement })
    }

    /// Attach the abort capability of the operation serving call `id`.
    pub fn attach_transport(&self, collection: &str, id: CallId, transport: impl Transport + 'static) -> bool {
        self.with_collection(collection, |calls| calls.attach_transport(id, Box::new(transport)))
            .unwrap_or(false)
    }

    pub fn find(&self, collection: &str, id: CallId) -> Option<CallSnapshot> {
        self.with_collection(collection, |calls| calls.find(id).map(|call| call.snapshot()))
            .flatten()
    }

    /// Oldest (or newest) unfinished call in a collection.
    ///
    /// When nothing is unfinished a detached stand-in is returned instead; it
    /// is never stored, so neither `find` nor `settle` can reach it. `None`
    /// only when the collection name does not resolve.
    pub fn find_unresolved(&self, collection: &str, prefer_newest: bool) -> Option<CallSnapshot> {
        let now = self.shared.scheduler.now();
        self.with_collection(collection, |calls| {
            calls
                .find_unresolved(prefer_newest)
                .map(|call| call.snapshot())
                .unwrap_or_else(|| CallSnapshot::detached(now))
        })
    }

    pub fn has_unresolved(&self, collection: &str) -> bool {
        self.with_collection(collection, |calls| calls.has_unresolved())
            .unwrap_or(false)
    }

    /// Number of calls currently held by a collection, settled or not.
    pub fn entry_count(&self, collection: &str) -> usize {
        self.with_collection(collection, |calls| calls.len()).unwrap_or(0)
    }

    /// Settle the call picked by `target`. Returns whether a call was settled.
    pub fn settle(&self, collection: &str, target: Target, outcome: Outcome<T>) -> bool {
        let settled = self
            .with_collection(collection, |calls| calls.settle(target, outcome))
            .unwrap_or(false);
        if !settled {
            log::debug!(
                "Request queue '{}': nothing to settle for {:?} in '{}'",
                self.shared.name,
                target,
                collection
            );
        }
        settled
    }

    pub fn resolve(&self, collection: &str, target: Target, value: T) -> bool {
        self.settle(collection, target, Outcome::Resolved(value))
    }

    pub fn reject(&self, collection: &str, target: Target, value: T) -> bool {
        self.settle(collection, target, Outcome::Rejected(value))
    }

    /// Supersede every unfinished call in a collection except `skip`.
    ///
    /// Returns the number of calls superseded.
    pub fn abort_all(&self, collection: &str, skip: Option<CallId>) -> usize {
        self.with_collection(collection, |calls| calls.abort_all(skip))
            .unwrap_or(0)
    }

    /// Remove finished calls from a collection after `after_ms` (default sweep delay).
    ///
    /// Which calls count as finished is decided when the sweep fires.
    pub fn sweep(&self, collection: &str, after_ms: Option<i64>) -> bool {
        match self.resolve_collection(collection, "sweep") {
            Some(name) => {
                self.schedule_sweep(name, delay_or(after_ms, self.shared.sweep_delay));
                true
            }
            None => false,
        }
    }

    /// Run `callback` once after `delay_ms` (default delay), outside any timer slot.
    pub fn invoke_after<F>(&self, delay_ms: Option<i64>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = delay_or(delay_ms, self.shared.default_delay);
        // Dropping the handle leaves the task scheduled.
        let _ = self.shared.scheduler.schedule(delay, Box::new(callback));
    }

    /// Throttle `callback` behind a named timer.
    ///
    /// Re-invoking while the timer slot is occupied (armed, or fired and not
    /// reset since) cancels any pending callback and supersedes every
    /// unfinished call in `collection` except `skip`. A sweep
    /// of `collection` is scheduled either way. Returns whether a timer was
    /// armed, which only fails when `timer` does not resolve.
    pub fn throttled_invoke<F>(
        &self,
        delay_ms: Option<i64>,
        timer: &str,
        collection: &str,
        callback: F,
        skip: Option<CallId>,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(timer) = self.shared.registry.timer(timer) else {
            log::warn!(
                "Request queue '{}': unknown timer '{}', throttled call dropped",
                self.shared.name,
                timer
            );
            return false;
        };
        let collection = self.shared.registry.collection(collection);
        let delay = delay_or(delay_ms, self.shared.default_delay);

        {
            let mut state = self.shared.state();

            if state.timers.cancel(&timer) {
                let superseded = collection
                    .as_ref()
                    .and_then(|name| state.calls.get_mut(name))
                    .map_or(0, |calls| calls.abort_all(skip));
                log::debug!(
                    "Request queue '{}': re-armed '{}', superseded {} call(s)",
                    self.shared.name,
                    timer,
                    superseded
                );
            }

            // Install under the same lock the firing task checks, so a cancelled
            // generation can never claim the slot.
            let generation = state.timers.next_generation();
            let task = self
                .shared
                .scheduler
                .schedule(delay, self.fire_timer(timer.clone(), generation, callback));
            state.timers.install(timer.clone(), generation, task);
        }

        log::debug!("Request queue '{}': armed '{}' for {:?}", self.shared.name, timer, delay);

        if let Some(name) = collection {
            self.schedule_sweep(name, self.shared.sweep_delay);
        }
        true
    }

    /// Return a timer slot to idle without touching any collection.
    ///
    /// The next trigger then arms without superseding anything.
    pub fn reset_timer(&self, timer: &str) -> bool {
        match self.shared.registry.timer(timer) {
            Some(timer) => self.shared.state().timers.cancel(&timer),
            None => false,
        }
    }

    /// Whether the timer slot is occupied. A slot stays occupied after its
    /// callback fires, until [`reset_timer`](Self::reset_timer) or
    /// [`cancel_all`](Self::cancel_all).
    pub fn is_armed(&self, timer: &str) -> bool {
        match self.shared.registry.timer(timer) {
            Some(timer) => self.shared.state().timers.is_armed(&timer),
            None => false,
        }
    }

    /// Whether the timer slot holds a callback that has not fired yet.
    pub fn is_pending(&self, timer: &str) -> bool {
        match self.shared.registry.timer(timer) {
            Some(timer) => self.shared.state().timers.is_pending(&timer),
            None => false,
        }
    }

    /// Reset every timer, supersede every unfinished call, then sweep every collection.
    pub fn cancel_all(&self) {
        let (timers, superseded) = {
            let mut state = self.shared.state();
            let timers = state.timers.cancel_all();
            let superseded: usize = state.calls.values_mut().map(|calls| calls.abort_all(None)).sum();
            (timers, superseded)
        };

        for name in self.shared.registry.collections() {
            self.schedule_sweep(name.clone(), self.shared.sweep_delay);
        }

        log::info!(
            "Request queue '{}' cancelled {} timer(s) and superseded {} call(s)",
            self.shared.name,
            timers,
            superseded
        );
    }

    fn resolve_collection(&self, collection: &str, operation: &str) -> Option<CollectionName> {
        let name = self.shared.registry.collection(collection);
        if name.is_none() {
            log::warn!(
                "Request queue '{}': unknown call collection '{}', {} ignored",
                self.shared.name,
                collection,
                operation
            );
        }
        name
    }

    fn with_collection<R>(&self, collection: &str, f: impl FnOnce(&mut CallCollection<T>) -> R) -> Option<R> {
        let name = self.shared.registry.collection(collection)?;
        let mut state = self.shared.state();
        state.calls.get_mut(&name).map(f)
    }

    fn fire_timer<F>(&self, timer: TimerName, generation: u64, callback: F) -> Task
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move || {
            let Some(shared) = Weak::upgrade(&shared) else {
                log::warn!("Timer '{}' fired after its request queue was dropped", timer);
                return;
            };
            let current = shared.state().timers.claim(&timer, generation);
            if current {
                log::debug!("Request queue '{}': timer '{}' fired", shared.name, timer);
                callback();
            }
        })
    }

    fn schedule_sweep(&self, name: CollectionName, delay: Duration) {
        let shared = Arc::downgrade(&self.shared);
        let task_name = name.clone();
        let _ = self.shared.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(shared) = Weak::upgrade(&shared) else {
                    return;
                };
                let removed = shared
                    .state()
                    .calls
                    .get_mut(&task_name)
                    .map_or(0, |calls| calls.sweep());
                log::debug!(
                    "Request queue '{}': swept {} finished call(s) from '{}'",
                    shared.name,
                    removed,
                    task_name
                );
            }),
        );
        log::debug!("Request queue '{}': sweep of '{}' in {:?}", self.shared.name, name, delay);
    }
}
