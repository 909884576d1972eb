pub mod backoff;
pub mod counters;
pub mod history;
pub mod manager;
mod queue;
pub mod retry;
pub mod task;
mod telemetry;


pub use backoff::Backoff;
pub use history::{ExecutionRecord, Outcome};
pub use manager::{ActiveTask, TaskManager, TaskStats};
pub use retry::{with_retry, RetryPolicy};
pub use task::{task_fn, Callback, Priority, TaskError, TaskFailure, TaskFn, TaskId, TaskOptions};
