//! Prometheus metrics functionality.
//!
//! Metric names for the cache, invalidator, subscription registry and task
//! manager. Recording is a no-op until a recorder is installed, so the core
//! works the same with or without an exporter.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// Metric name constants
pub const CACHE_LOCAL_HITS: &str = "cache_local_hits";
pub const CACHE_REMOTE_HITS: &str = "cache_remote_hits";
pub const CACHE_MISSES: &str = "cache_misses";
pub const CACHE_LOADS: &str = "cache_loads";
pub const CACHE_LOAD_ERRORS: &str = "cache_load_errors";
pub const CACHE_REMOTE_ERRORS: &str = "cache_remote_errors";
pub const CACHE_INVALIDATED: &str = "cache_invalidated_keys";
pub const CACHE_SWEPT: &str = "cache_swept_entries";
pub const CACHE_LOCAL_LENGTH: &str = "cache_local_length";

pub const INVALIDATIONS: &str = "invalidations_total";
pub const INVALIDATIONS_UNKNOWN: &str = "invalidations_unknown_change_type";

pub const PUSH_TARGETED: &str = "push_targeted";
pub const PUSH_BROADCAST: &str = "push_broadcast";
pub const PUSH_ERRORS: &str = "push_errors";
pub const SUBSCRIPTION_SESSIONS: &str = "subscription_sessions";

pub const TASKS_SUBMITTED: &str = "tasks_submitted";
pub const TASKS_REJECTED: &str = "tasks_rejected";
pub const TASKS_COMPLETED: &str = "tasks_completed";
pub const TASKS_FAILED: &str = "tasks_failed";
pub const TASKS_RETRIED: &str = "tasks_retried";
pub const TASKS_TIMED_OUT: &str = "tasks_timed_out";
pub const TASKS_READY: &str = "tasks_ready";
pub const TASKS_DELAYED: &str = "tasks_delayed";
pub const TASKS_ACTIVE: &str = "tasks_active";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder and returns the render handle.
///
/// The host application serves `handle.render()` on its own metrics route.
/// Calling it again returns the already installed handle.
pub fn init_prometheus_exporter() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Adds cache hits served by the local tier.
pub fn add_local_hits(value: u64) {
    metrics::counter!(CACHE_LOCAL_HITS).increment(value);
}

/// Adds cache hits served by the remote tier.
pub fn add_remote_hits(value: u64) {
    metrics::counter!(CACHE_REMOTE_HITS).increment(value);
}

/// Adds cache misses at both tiers.
pub fn add_misses(value: u64) {
    metrics::counter!(CACHE_MISSES).increment(value);
}

/// Adds loader outcomes.
pub fn add_loads(ok: u64, errors: u64) {
    metrics::counter!(CACHE_LOADS).increment(ok);
    metrics::counter!(CACHE_LOAD_ERRORS).increment(errors);
}

/// Adds remote tier failures (errors and timeouts).
pub fn add_remote_errors(value: u64) {
    metrics::counter!(CACHE_REMOTE_ERRORS).increment(value);
}

/// Adds keys removed by explicit or pattern invalidation.
pub fn add_invalidated(value: u64) {
    metrics::counter!(CACHE_INVALIDATED).increment(value);
}

/// Adds entries removed by the maintenance sweep.
pub fn add_swept(value: u64) {
    metrics::counter!(CACHE_SWEPT).increment(value);
}

/// Sets the local tier length.
pub fn set_local_length(len: usize) {
    metrics::gauge!(CACHE_LOCAL_LENGTH).set(len as f64);
}

/// Adds one processed change event.
pub fn add_invalidation(known: bool) {
    if known {
        metrics::counter!(INVALIDATIONS).increment(1);
    } else {
        metrics::counter!(INVALIDATIONS_UNKNOWN).increment(1);
    }
}

/// Adds push deliveries.
pub fn add_pushes(targeted: u64, broadcast: u64, errors: u64) {
    metrics::counter!(PUSH_TARGETED).increment(targeted);
    metrics::counter!(PUSH_BROADCAST).increment(broadcast);
    metrics::counter!(PUSH_ERRORS).increment(errors);
}

/// Sets the number of connected sessions.
pub fn set_sessions(value: usize) {
    metrics::gauge!(SUBSCRIPTION_SESSIONS).set(value as f64);
}

/// Adds task submission outcomes.
pub fn add_submissions(accepted: u64, rejected: u64) {
    metrics::counter!(TASKS_SUBMITTED).increment(accepted);
    metrics::counter!(TASKS_REJECTED).increment(rejected);
}

/// Adds task execution statistics.
pub fn add_task_stat_counters(completed: u64, failed: u64, retried: u64, timed_out: u64) {
    metrics::counter!(TASKS_COMPLETED).increment(completed);
    metrics::counter!(TASKS_FAILED).increment(failed);
    metrics::counter!(TASKS_RETRIED).increment(retried);
    metrics::counter!(TASKS_TIMED_OUT).increment(timed_out);
}

/// Sets task queue gauges.
pub fn set_task_queues(ready: usize, delayed: usize, active: usize) {
    metrics::gauge!(TASKS_READY).set(ready as f64);
    metrics::gauge!(TASKS_DELAYED).set(delayed as f64);
    metrics::gauge!(TASKS_ACTIVE).set(active as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the exporter installs once and renders recorded counters.
    #[test]
    fn test_prometheus_exporter() {
        let handle = init_prometheus_exporter().expect("recorder installs");
        add_submissions(3, 1);
        let again = init_prometheus_exporter().expect("handle is reused");

        let rendered = again.render();
        assert!(rendered.contains(TASKS_SUBMITTED));
        assert!(rendered.contains(TASKS_REJECTED));
        assert_eq!(handle.render().is_empty(), rendered.is_empty());
    }
}
