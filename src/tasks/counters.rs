// Package tasks provides counters for the task manager.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime totals of the task manager.
pub struct Counters {
    /// Accepted submissions.
    pub submitted: AtomicU64,
    /// Submissions refused at capacity.
    pub rejected: AtomicU64,
    /// Tasks finished successfully.
    pub completed: AtomicU64,
    /// Tasks that exhausted their retries.
    pub failed: AtomicU64,
    /// Attempts re-parked for retry.
    pub retried: AtomicU64,
    /// Attempts cut off by their timeout.
    pub timed_out: AtomicU64,
}

/// Plain copy of [`Counters`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// Growth since `prev`.
    pub fn delta(&self, prev: &Snapshot) -> Snapshot {
        Snapshot {
            submitted: self.submitted.saturating_sub(prev.submitted),
            rejected: self.rejected.saturating_sub(prev.rejected),
            completed: self.completed.saturating_sub(prev.completed),
            failed: self.failed.saturating_sub(prev.failed),
            retried: self.retried.saturating_sub(prev.retried),
            timed_out: self.timed_out.saturating_sub(prev.timed_out),
        }
    }
}
