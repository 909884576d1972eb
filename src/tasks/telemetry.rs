// Package tasks provides telemetry for the task manager.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::metrics;

use super::counters::Snapshot;
use super::manager::Shared;

/// Telemetry logger for the task manager.
pub(super) async fn logger(shutdown_token: CancellationToken, shared: Arc<Shared>, each: Duration) {
    let mut ticker = interval(each);
    let mut prev = Snapshot::default();

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                tracing::debug!(component = "tasks", "logger stopped");
                return;
            }
            _ = ticker.tick() => {
                let stats = shared.stats(true);
                let now = shared.counters.snapshot();
                let delta = now.delta(&prev);
                prev = now;

                metrics::add_task_stat_counters(delta.completed, delta.failed, delta.retried, delta.timed_out);
                metrics::set_task_queues(stats.ready, stats.delayed, stats.active);

                tracing::info!(
                    component = "tasks",
                    workers = stats.workers,
                    ready = stats.ready,
                    delayed = stats.delayed,
                    active = stats.active,
                    submitted = delta.submitted,
                    rejected = delta.rejected,
                    completed = delta.completed,
                    failed = delta.failed,
                    retried = delta.retried,
                    timed_out = delta.timed_out,
                    "task manager stats"
                );
            }
        }
    }
}
