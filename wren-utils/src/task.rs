//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::{task, time};
use tracing::{Instrument, debug, error};

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// By default, dropping this handle cancels the task (unless [`Task::detach`]
/// is used).
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// A handle which can be used to manipulate the interval task created by the
/// [`IntervalTask::new`] function.
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
    control: UnboundedSender<()>,
}

/// A unit of periodic work driven by the cooperative [`TaskRunner`].
///
/// Implementations must not block: `run` executes inline on the timer
/// context, between packet batches.
pub trait PeriodicTask: Send {
    fn name(&self) -> &'static str;
    fn period(&self) -> Duration;
    fn run(&mut self, now: Instant);
}

/// Cooperative runner invoking every registered task whose period has
/// elapsed since its previous run.
#[derive(Default)]
pub struct TaskRunner {
    tasks: Vec<RunnerEntry>,
}

struct RunnerEntry {
    task: Box<dyn PeriodicTask>,
    last_run: Option<Instant>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Spawns a supervised task that automatically restarts if it panics.
    /// The task will terminate if it completes successfully or returns an
    /// error.
    ///
    /// Long-running receive loops exposed to malformed input should prefer
    /// this over [`Task::spawn`]: the offending frame is discarded and the
    /// loop keeps running instead of taking the router down.
    pub fn spawn_supervised<F, Fut>(spawn_fn: F) -> Task<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let join_handle = tokio::spawn(
            async move {
                loop {
                    let worker_task = Task::spawn(spawn_fn());
                    match worker_task.await {
                        Ok(_) => {
                            // Finished without panic.
                            break;
                        }
                        Err(error) if error.is_panic() => {
                            error!("task panicked, restarting...");
                            continue;
                        }
                        Err(error) => {
                            error!(%error, "task failed");
                            break;
                        }
                    }
                }
            }
            .in_current_span(),
        );
        Task {
            join_handle,
            detached: false,
        }
    }

    /// Detach the task, meaning it will no longer be canceled if its handle
    /// is dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever
    /// the specified interval timer ticks.
    ///
    /// Returns a handler that can be used to manipulate the interval task.
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let task = Task::spawn(
            async move {
                let mut interval_fut = if tick_on_start {
                    time::interval(interval)
                } else {
                    let start = time::Instant::now() + interval;
                    time::interval_at(start, interval)
                };

                loop {
                    tokio::select! {
                        // Interval timer has ticked.
                        _ = interval_fut.tick() => {
                            (cb)().await;
                        }
                        message = control_rx.recv() => {
                            match message {
                                // Interval timer has been restarted.
                                Some(()) => {
                                    interval_fut = time::interval(interval);
                                },
                                // Interval timer has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        IntervalTask {
            _task: task,
            control: control_tx,
        }
    }

    /// Resets the interval, restarting the countdown to the next tick.
    pub fn reset(&mut self) {
        if self.control.send(()).is_err() {
            error!("failed to reset interval");
        }
    }
}

// ===== impl TaskRunner =====

impl TaskRunner {
    pub fn new() -> TaskRunner {
        TaskRunner::default()
    }

    /// Registers a periodic task. The task first runs on the next
    /// [`TaskRunner::advance`] call.
    pub fn register(&mut self, task: Box<dyn PeriodicTask>) {
        debug!(name = %task.name(), period = ?task.period(), "task registered");
        self.tasks.push(RunnerEntry {
            task,
            last_run: None,
        });
    }

    /// Runs every task whose period has elapsed at `now`.
    pub fn advance(&mut self, now: Instant) {
        for entry in &mut self.tasks {
            let due = match entry.last_run {
                Some(last_run) => now.duration_since(last_run) >= entry.task.period(),
                None => true,
            };
            if due {
                entry.task.run(now);
                entry.last_run = Some(now);
            }
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingTask {
        period: Duration,
        count: Arc<AtomicUsize>,
    }

    impl PeriodicTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn period(&self) -> Duration {
            self.period
        }

        fn run(&mut self, _now: Instant) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn runner_respects_periods() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut runner = TaskRunner::new();
        runner.register(Box::new(CountingTask {
            period: Duration::from_secs(3),
            count: count.clone(),
        }));

        let start = Instant::now();
        runner.advance(start);
        assert_eq!(count.load(Ordering::Relaxed), 1);

        // One period has not elapsed yet.
        runner.advance(start + Duration::from_secs(1));
        assert_eq!(count.load(Ordering::Relaxed), 1);

        runner.advance(start + Duration::from_secs(3));
        assert_eq!(count.load(Ordering::Relaxed), 2);

        // last_run advances to the run time, not by whole periods.
        runner.advance(start + Duration::from_secs(5));
        assert_eq!(count.load(Ordering::Relaxed), 2);
        runner.advance(start + Duration::from_secs(6));
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }
}
