// Package tasks runs queued work on a fixed worker pool.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TaskSettings;
use crate::metrics;

use super::backoff::Backoff;
use super::counters::Counters;
use super::history::{ExecutionRecord, History, Outcome};
use super::queue::TaskQueue;
use super::task::{Priority, Task, TaskError, TaskFailure, TaskFn, TaskId, TaskOptions};
use super::telemetry;

/// Idle workers re-check the queue at least this often.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// A task currently held by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTask {
    pub task_id: TaskId,
    pub worker: usize,
    pub priority: Priority,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub running: bool,
    pub workers: usize,
    pub ready: usize,
    pub delayed: usize,
    pub active: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
}

pub(super) struct Shared {
    pub settings: TaskSettings,
    pub queue: Mutex<TaskQueue>,
    pub history: Mutex<History>,
    pub active: Mutex<HashMap<usize, ActiveTask>>,
    pub counters: Counters,
    pub workers: AtomicU64,
    wakeup: Notify,
    seq: AtomicU64,
}

impl Shared {
    fn wake(&self, n: usize) {
        for _ in 0..n {
            self.wakeup.notify_one();
        }
    }

    pub fn stats(&self, running: bool) -> TaskStats {
        let (ready, delayed) = {
            let q = self.queue.lock();
            (q.ready_len(), q.delayed_len())
        };
        let c = self.counters.snapshot();
        TaskStats {
            running,
            workers: self.workers.load(Ordering::Relaxed) as usize,
            ready,
            delayed,
            active: self.active.lock().len(),
            submitted: c.submitted,
            rejected: c.rejected,
            completed: c.completed,
            failed: c.failed,
            retried: c.retried,
            timed_out: c.timed_out,
        }
    }
}

struct Pool {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Priority-ordered background executor.
///
/// Ready tasks run by ascending priority then submission order. Delayed
/// tasks and retries wait in a separate area until a scheduler loop promotes
/// them. Each attempt runs in its own tokio task so panics and timeouts stay
/// contained.
pub struct TaskManager {
    shared: Arc<Shared>,
    shutdown_token: CancellationToken,
    running: AtomicBool,
    pool: Mutex<Option<Pool>>,
}

impl TaskManager {
    pub fn new(shutdown_token: CancellationToken, settings: TaskSettings) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TaskQueue::new(settings.queue_capacity)),
            history: Mutex::new(History::new(settings.history)),
            active: Mutex::new(HashMap::new()),
            counters: Counters::new(),
            workers: AtomicU64::new(0),
            wakeup: Notify::new(),
            seq: AtomicU64::new(0),
            settings,
        });
        Self {
            shared,
            shutdown_token,
            running: AtomicBool::new(false),
            pool: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.shared.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the scheduler, the stats logger and `num_workers` workers.
    /// Returns false when already running.
    pub fn start(&self, num_workers: usize) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(component = "tasks", event = "start", "task manager already running");
            return false;
        }

        let num_workers = num_workers.max(1);
        let token = self.shutdown_token.child_token();
        let mut handles = Vec::with_capacity(num_workers + 2);

        handles.push(tokio::spawn(scheduler(
            token.clone(),
            self.shared.clone(),
            self.shared.settings.scheduler_interval,
        )));
        if !self.shared.settings.stats_interval.is_zero() {
            handles.push(tokio::spawn(telemetry::logger(
                token.clone(),
                self.shared.clone(),
                self.shared.settings.stats_interval,
            )));
        }
        for worker in 0..num_workers {
            handles.push(tokio::spawn(run_worker(token.clone(), self.shared.clone(), worker)));
        }
        self.shared.workers.store(num_workers as u64, Ordering::Relaxed);
        *self.pool.lock() = Some(Pool { token, handles });

        info!(component = "tasks", event = "started", workers = num_workers, "task manager started");
        true
    }

    /// Stops the pool. Workers finish their in-flight attempt; whatever has
    /// not exited by `timeout` is aborted. Queued tasks stay queued. Returns
    /// whether every loop exited on its own.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let pool = self.pool.lock().take();
        let Some(Pool { token, handles }) = pool else {
            return true;
        };
        token.cancel();
        self.shared.wakeup.notify_waiters();

        let deadline = Instant::now() + timeout;
        let mut clean = true;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    clean = false;
                    error!(component = "tasks", event = "join_failed", error = %e, "task loop ended abnormally");
                }
                Err(_) => {
                    clean = false;
                    handle.abort();
                }
            }
        }

        // aborted workers never cleared their slot
        self.shared.active.lock().clear();
        self.shared.workers.store(0, Ordering::Relaxed);
        self.running.store(false, Ordering::Release);
        if clean {
            info!(component = "tasks", event = "stopped", "task manager stopped");
        } else {
            warn!(component = "tasks", event = "stopped", timeout = ?timeout, "task manager stopped with stragglers aborted");
        }
        clean
    }

    /// Queues a task. Returns false when the target area is full.
    pub fn submit_task(&self, id: impl Into<TaskId>, run: TaskFn, options: TaskOptions) -> bool {
        let settings = &self.shared.settings;
        let now = Instant::now();
        let task = Task {
            id: id.into(),
            priority: options.priority,
            run,
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(settings.max_retries),
            retry_delay: options.retry_delay.unwrap_or(settings.retry_delay),
            timeout: options.timeout,
            callback: options.callback,
            created_at: now,
            scheduled_at: (!options.delay.is_zero()).then(|| now + options.delay),
            seq: self.shared.seq.fetch_add(1, Ordering::Relaxed),
        };
        let delayed = task.scheduled_at.is_some();

        let submitted = self.shared.queue.lock().submit(task);
        match submitted {
            Ok(()) => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::add_submissions(1, 0);
                if !delayed {
                    self.shared.wake(1);
                }
                true
            }
            Err(task) => {
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::add_submissions(0, 1);
                warn!(component = "tasks", event = "rejected", task_id = %task.id, delayed, "queue at capacity");
                false
            }
        }
    }

    /// Cancelling queued tasks is not offered.
    pub fn cancel_task(&self, _id: &str) -> Result<(), TaskError> {
        Err(TaskError::Unsupported)
    }

    pub fn get_stats(&self) -> TaskStats {
        self.shared.stats(self.is_running())
    }

    /// Tasks held by workers right now, by worker id.
    pub fn get_active_tasks(&self) -> Vec<ActiveTask> {
        let mut active: Vec<ActiveTask> = self.shared.active.lock().values().cloned().collect();
        active.sort_by_key(|a| a.worker);
        active
    }

    /// Most recent finished tasks, oldest first.
    pub fn get_task_history(&self) -> Vec<ExecutionRecord> {
        self.shared.history.lock().snapshot()
    }
}

async fn scheduler(token: CancellationToken, shared: Arc<Shared>, each: Duration) {
    let mut ticker = interval(each);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(component = "tasks", event = "scheduler_stopped", "scheduler stopped");
                return;
            }
            _ = ticker.tick() => {
                let promoted = shared.queue.lock().promote_due(Instant::now());
                if promoted > 0 {
                    debug!(component = "tasks", event = "promoted", promoted, "delayed tasks ready");
                    shared.wake(promoted);
                }
            }
        }
    }
}

async fn run_worker(token: CancellationToken, shared: Arc<Shared>, worker: usize) {
    debug!(component = "tasks", event = "worker_started", worker, "worker started");
    loop {
        if token.is_cancelled() {
            break;
        }
        let next = shared.queue.lock().pop_ready();
        match next {
            Some(task) => execute(&shared, worker, task).await,
            None => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.wakeup.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }
    debug!(component = "tasks", event = "worker_stopped", worker, "worker stopped");
}

async fn execute(shared: &Shared, worker: usize, mut task: Task) {
    let started_at = Utc::now();
    let started = Instant::now();
    shared.active.lock().insert(
        worker,
        ActiveTask {
            task_id: task.id.clone(),
            worker,
            priority: task.priority,
            attempt: task.attempt(),
            started_at,
        },
    );

    let result = run_attempt(task.run.clone(), task.timeout).await;
    shared.active.lock().remove(&worker);

    let failure = match result {
        Ok(value) => {
            shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            debug!(component = "tasks", event = "completed", task_id = %task.id, attempt = task.attempt(), "task completed");
            finish(shared, worker, &mut task, started_at, started.elapsed(), Ok(value));
            return;
        }
        Err(failure) => failure,
    };

    if matches!(failure, TaskFailure::TimedOut(_)) {
        shared.counters.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    if task.retry_count < task.max_retries {
        let backoff = Backoff::new(task.retry_delay, shared.settings.max_retry_delay);
        let delay = backoff.delay_for(task.retry_count);
        warn!(
            component = "tasks",
            event = "retry",
            task_id = %task.id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            delay = ?delay,
            error = %failure,
            "attempt failed, retry scheduled"
        );
        task.retry_count += 1;
        task.scheduled_at = Some(Instant::now() + delay);
        shared.counters.retried.fetch_add(1, Ordering::Relaxed);
        shared.queue.lock().park(task);
        return;
    }

    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
    error!(
        component = "tasks",
        event = "failed",
        task_id = %task.id,
        retry_count = task.retry_count,
        error = %failure,
        "task failed, retries exhausted"
    );
    finish(shared, worker, &mut task, started_at, started.elapsed(), Err(failure));
}

/// Runs one attempt in its own tokio task, bounded by the task timeout.
///
/// The closure is called inside the spawned task so a panic while building
/// the future is contained like one raised while polling it.
async fn run_attempt(run: TaskFn, timeout: Option<Duration>) -> Result<Value, TaskFailure> {
    let mut handle = tokio::spawn(async move { run().await });
    let joined = match timeout {
        None => handle.await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(TaskFailure::TimedOut(limit));
            }
        },
    };
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskFailure::Error(format!("{:#}", e))),
        Err(e) => Err(join_failure(e)),
    }
}

fn join_failure(e: JoinError) -> TaskFailure {
    if !e.is_panic() {
        return TaskFailure::Aborted;
    }
    let panic = e.into_panic();
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    TaskFailure::Panicked(msg)
}

/// Records the terminal state and fires the callback once.
fn finish(
    shared: &Shared,
    worker: usize,
    task: &mut Task,
    started_at: DateTime<Utc>,
    duration: Duration,
    result: Result<Value, TaskFailure>,
) {
    let (outcome, error) = match &result {
        Ok(_) => (Outcome::Completed, None),
        Err(e) => (Outcome::Failed, Some(e.clone())),
    };
    shared.history.lock().push(ExecutionRecord {
        task_id: task.id.clone(),
        priority: task.priority,
        outcome,
        attempts: task.attempt(),
        worker,
        started_at,
        finished_at: Utc::now(),
        duration,
        error,
    });

    if let Some(callback) = task.callback.take() {
        let id = task.id.clone();
        if std::panic::catch_unwind(AssertUnwindSafe(move || callback(&id, result))).is_err() {
            error!(component = "tasks", event = "callback_panicked", task_id = %task.id, "completion callback panicked");
        }
    }
}
