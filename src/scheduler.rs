//! Delayed invocation primitive.
//!
//! The queue never touches wall-clock timers directly. It schedules one-shot
//! tasks through a [`Scheduler`], so production code runs on Tokio while tests
//! can fast-forward a [`VirtualScheduler`] deterministically.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;

/// One-shot unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Monotonic time elapsed since the scheduler was created.
    fn now(&self) -> Duration;

    /// Run `task` once after `delay`, unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Handle to a scheduled task.
///
/// Cancelling is idempotent, and cancelling a task that already ran is a no-op.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    pub fn new(token: CancellationToken) -> Self {
        ScheduledTask { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Scheduler backed by the Tokio runtime.
pub struct TokioScheduler {
    runtime: Handle,
    started_at: Instant,
    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl TokioScheduler {
    /// Create a scheduler on the current runtime.
    ///
    /// Cancelling `cancel_token` cancels every task scheduled through it.
    pub fn new(cancel_token: CancellationToken) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::with_handle(runtime, cancel_token))
    }

    pub fn with_handle(runtime: Handle, cancel_token: CancellationToken) -> Self {
        TokioScheduler {
            runtime,
            started_at: Instant::now(),
            cancel_token,
        }
    }

    /// Cancel every outstanding task.
    pub fn shutdown(&self) {
        log::info!("Scheduler shutting down, cancelling outstanding tasks");
        self.cancel_token.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let token = self.cancel_token.child_token();
        let task_token = token.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                biased;

                _ = task_token.cancelled() => {}

                _ = tokio::time::sleep(delay) => {
                    task();
                }
            }
        });

        ScheduledTask::new(token)
    }
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Nothing runs until [`advance`](VirtualScheduler::advance) is called.
#[derive(Clone, Default)]
pub struct VirtualScheduler {
    inner: Arc<Mutex<VirtualClock>>,
}

#[derive(Default)]
struct VirtualClock {
    now: Duration,
    next_seq: u64,
    /// (due time, scheduling order) -> task
    pending: BTreeMap<(Duration, u64), (CancellationToken, Task)>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward, running every task that falls due on the way.
    ///
    /// Tasks scheduled by running tasks also run if they fall due before the
    /// target time. Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock().now + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut clock = self.clock();
                match clock.pending.first_key_value() {
                    Some((&(due, _), _)) if due <= target => {
                        clock.now = due;
                        clock.pending.pop_first()
                    }
                    _ => {
                        clock.now = target;
                        None
                    }
                }
            };

            let Some((_, (token, task))) = next else {
                break;
            };
            if !token.is_cancelled() {
                task();
                ran += 1;
            }
        }

        ran
    }

    /// Number of scheduled tasks that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.clock()
            .pending
            .values()
            .filter(|(token, _)| !token.is_cancelled())
            .count()
    }

    fn clock(&self) -> MutexGuard<'_, VirtualClock> {
        // Tasks run outside the lock, so a poisoned guard still holds consistent data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        self.clock().now
    }

    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let token = CancellationToken::new();
        let mut clock = self.clock();
        let key = (clock.now + delay, clock.next_seq);
        clock.next_seq += 1;
        clock.pending.insert(key, (token.clone(), task));
        ScheduledTask::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let make = {
            let count = count.clone();
            move || -> Task {
                let count = count.clone();
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            }
        };
        (count, make)
    }

    #[test]
    fn test_virtual_runs_due_tasks_in_order() {
        let scheduler = VirtualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, label) in [(30, "c"), (10, "a"), (10, "b")] {
            let order = order.clone();
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || order.lock().unwrap().push(label)),
            );
        }

        assert_eq!(scheduler.advance(Duration::from_millis(9)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 2);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(scheduler.now(), Duration::from_millis(10));
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now(), Duration::from_millis(1010));
    }

    #[test]
    fn test_virtual_cancelled_task_never_runs() {
        let scheduler = VirtualScheduler::new();
        let (count, task) = counter();

        let handle = scheduler.schedule(Duration::from_millis(5), task());
        handle.cancel();
        handle.cancel();

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_virtual_nested_schedule_within_window() {
        let scheduler = VirtualScheduler::new();
        let (count, task) = counter();

        let nested = scheduler.clone();
        let inner = task();
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                nested.schedule(Duration::from_millis(10), inner);
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_millis(20)), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_task_fires_after_delay() {
        let scheduler = TokioScheduler::new(CancellationToken::new()).unwrap();
        let (count, task) = counter();

        scheduler.schedule(Duration::from_millis(50), task());

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.now() >= Duration::from_millis(51));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_cancel_and_shutdown() {
        let scheduler = TokioScheduler::new(CancellationToken::new()).unwrap();
        let (count, task) = counter();

        let cancelled = scheduler.schedule(Duration::from_millis(50), task());
        cancelled.cancel();
        scheduler.schedule(Duration::from_millis(50), task());
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tokio_requires_runtime() {
        assert!(matches!(
            TokioScheduler::new(CancellationToken::new()),
            Err(QueueError::NoRuntime)
        ));
    }
}
