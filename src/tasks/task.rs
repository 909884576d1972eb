// Package tasks defines background task values and options.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub type TaskId = String;

/// Boxed task body. Called once per attempt.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Completion callback: the result on success, the final failure once
/// retries are exhausted. Called exactly once per task.
pub type Callback = Box<dyn FnOnce(&str, Result<Value, TaskFailure>) + Send>;

/// Boxes an async closure into a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Scheduling urgency. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(5);
    pub const LOW: Priority = Priority(10);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why one attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskFailure {
    #[error("task failed: {0}")]
    Error(String),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),
    #[error("task aborted")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task cancellation is not supported")]
    Unsupported,
}

/// Per-submission knobs. Unset retry fields fall back to the manager settings.
#[derive(Default)]
pub struct TaskOptions {
    pub(crate) priority: Priority,
    pub(crate) max_retries: Option<u32>,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) delay: Duration,
    pub(crate) callback: Option<Callback>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Base delay of the exponential backoff.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Bound on a single attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Keeps the task away from workers for `delay` after submission.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&str, Result<Value, TaskFailure>) + Send + 'static,
    {
        self.callback = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// A task owned by the manager from submission to its terminal state.
pub(crate) struct Task {
    pub id: TaskId,
    pub priority: Priority,
    pub run: TaskFn,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Option<Duration>,
    pub callback: Option<Callback>,
    pub created_at: Instant,
    pub scheduled_at: Option<Instant>,
    pub seq: u64,
}

impl Task {
    /// Attempt number of the next run, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("seq", &self.seq)
            .finish()
    }
}
