// Package model provides the local-tier cache entry.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Entry held by the local tier: the payload and when it was written.
#[derive(Debug, Clone)]
pub struct Entry {
    payload: Value,
    written_at: Instant,
}

impl Entry {
    /// Creates a new entry stamped with the current time.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            written_at: Instant::now(),
        }
    }

    /// Gets the payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Time elapsed since the write.
    pub fn age(&self) -> Duration {
        self.written_at.elapsed()
    }

    /// An entry is alive while its age is strictly below the ttl.
    pub fn is_alive(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
