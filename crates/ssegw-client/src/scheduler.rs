//! Deferred and background task execution.
//!
//! The engine never touches the runtime directly: delayed work (the flush
//! debounce) and background work (the push-stream reader, the batch sender)
//! go through a [`TaskScheduler`]. [`DebounceTimer`] layers
//! cancel-and-reschedule semantics on top.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

/// Handle to a scheduled or spawned task.
pub trait ScheduledTask: Send {
    /// Cancel the task. No-op if it already ran.
    fn cancel(&self);

    /// Whether the task has not yet finished.
    fn is_pending(&self) -> bool;
}

/// Runs delayed closures and background futures.
pub trait TaskScheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTask>;

    /// Run `task` in the background.
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Box<dyn ScheduledTask>;
}

/// [`TaskScheduler`] on the ambient tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

struct TokioTask(JoinHandle<()>);

impl ScheduledTask for TokioTask {
    fn cancel(&self) {
        self.0.abort();
    }

    fn is_pending(&self) -> bool {
        !self.0.is_finished()
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTask> {
        Box::new(TokioTask(tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            task();
        })))
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) -> Box<dyn ScheduledTask> {
        Box::new(TokioTask(tokio::spawn(task)))
    }
}

/// A single pending delayed task; scheduling again replaces it.
///
/// Each scheduled task receives the generation it was armed under. A task
/// that was already running when it got cancelled or replaced finds its
/// generation stale in [`DebounceTimer::fire`] and must do nothing.
pub struct DebounceTimer {
    scheduler: Arc<dyn TaskScheduler>,
    pending: Option<Box<dyn ScheduledTask>>,
    generation: u64,
}

impl DebounceTimer {
    /// Create an idle timer.
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            scheduler,
            pending: None,
            generation: 0,
        }
    }

    /// Cancel any pending task and schedule `task` after `delay`. The task is
    /// called with its generation.
    pub fn schedule(&mut self, delay: Duration, task: impl FnOnce(u64) + Send + 'static) {
        self.cancel();
        let generation = self.generation;
        self.pending = Some(
            self.scheduler
                .schedule(delay, Box::new(move || task(generation))),
        );
    }

    /// Cancel the pending task, if any. A task already running is invalidated.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.pending.take() {
            task.cancel();
        }
    }

    /// Whether a task is waiting to run.
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| t.is_pending())
    }

    /// Claim the run of the task armed under `generation`, clearing the
    /// pending slot. Returns false when that task was cancelled or replaced
    /// after it started; the slot then belongs to its successor.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.pending = None;
        true
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("armed", &self.is_armed())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&shared);
            Box::new(move || {
                let _ = c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    fn ignore_generation(task: Box<dyn FnOnce() + Send>) -> impl FnOnce(u64) + Send + 'static {
        move |_| task()
    }

    /// Holds delayed tasks until the test runs them.
    #[derive(Default)]
    struct ManualScheduler {
        queued: Mutex<Vec<(Box<dyn FnOnce() + Send>, Arc<AtomicBool>)>>,
    }

    struct ManualTask(Arc<AtomicBool>);

    impl ScheduledTask for ManualTask {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }

        fn is_pending(&self) -> bool {
            !self.0.load(Ordering::SeqCst)
        }
    }

    impl TaskScheduler for ManualScheduler {
        fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTask> {
            let cancelled = Arc::new(AtomicBool::new(false));
            self.queued.lock().push((task, Arc::clone(&cancelled)));
            Box::new(ManualTask(cancelled))
        }

        fn spawn(&self, task: BoxFuture<'static, ()>) -> Box<dyn ScheduledTask> {
            TokioScheduler.spawn(task)
        }
    }

    impl ManualScheduler {
        fn live(&self) -> usize {
            self.queued
                .lock()
                .iter()
                .filter(|(_, cancelled)| !cancelled.load(Ordering::SeqCst))
                .count()
        }

        /// Run every task that was not cancelled.
        fn run_live(&self) {
            let queued = std::mem::take(&mut *self.queued.lock());
            for (task, cancelled) in queued {
                if !cancelled.load(Ordering::SeqCst) {
                    task();
                }
            }
        }

        /// Remove the oldest queued task, as if its timer had just expired.
        fn take_next(&self) -> Box<dyn FnOnce() + Send> {
            self.queued.lock().remove(0).0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_runs_after_delay() {
        let (count, make) = counter();
        let task = TokioScheduler.schedule(Duration::from_millis(100), make());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_pending());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_runs_on_next_turn() {
        let (count, make) = counter();
        let _task = TokioScheduler.schedule(Duration::ZERO, make());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_replaces_pending_task() {
        let (count, make) = counter();
        let mut timer = DebounceTimer::new(Arc::new(TokioScheduler));
        timer.schedule(Duration::from_millis(100), ignore_generation(make()));
        tokio::time::sleep(Duration::from_millis(80)).await;
        timer.schedule(Duration::from_millis(100), ignore_generation(make()));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(timer.is_armed());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let (count, make) = counter();
        let mut timer = DebounceTimer::new(Arc::new(TokioScheduler));
        timer.schedule(Duration::from_millis(10), ignore_generation(make()));
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let (count, make) = counter();
        {
            let mut timer = DebounceTimer::new(Arc::new(TokioScheduler));
            timer.schedule(Duration::from_millis(10), ignore_generation(make()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn task_replaced_while_running_does_not_orphan_successor() {
        let scheduler = Arc::new(ManualScheduler::default());
        let timer = Arc::new(Mutex::new(DebounceTimer::new(scheduler.clone())));
        let runs = Arc::new(AtomicUsize::new(0));
        let arm = |timer: &Arc<Mutex<DebounceTimer>>| {
            let owner = Arc::clone(timer);
            let runs = Arc::clone(&runs);
            timer.lock().schedule(Duration::from_millis(100), move |generation| {
                if owner.lock().fire(generation) {
                    let _ = runs.fetch_add(1, Ordering::SeqCst);
                }
            });
        };

        arm(&timer);
        let first = scheduler.take_next();
        // Rescheduled after the first task started but before it took the lock.
        arm(&timer);
        first();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(timer.lock().is_armed());

        arm(&timer);
        assert_eq!(scheduler.live(), 1);

        scheduler.run_live();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!timer.lock().is_armed());
    }

    #[test]
    fn fire_after_cancel_is_rejected() {
        let scheduler = Arc::new(ManualScheduler::default());
        let mut timer = DebounceTimer::new(scheduler);
        timer.schedule(Duration::ZERO, |_| {});
        timer.cancel();
        assert!(!timer.fire(1));
        assert!(!timer.fire(0));
    }

    #[tokio::test]
    async fn spawn_runs_future() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _task = TokioScheduler.spawn(Box::pin(async move {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }
}
