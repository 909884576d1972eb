// Package cache exposes the shared remote tier interface.

use serde_json::Value;
use std::time::Duration;

/// Errors reported by a remote tier. The tiered store never propagates them.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote tier unavailable: {0}")]
    Unavailable(String),
    #[error("remote tier call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote payload is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Shared cache tier reachable from every process.
///
/// Entries carry their own ttl on write and the tier expires them natively;
/// the store never re-checks remote entry age.
#[async_trait::async_trait]
pub trait RemoteTier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Reads a payload by full key.
    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError>;

    /// Writes a payload that expires after `ttl`.
    async fn set(&self, key: &str, payload: &Value, ttl: Duration) -> Result<(), RemoteError>;

    /// Deletes one key, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, RemoteError>;

    /// Deletes every key that starts with `prefix` and whose remainder
    /// contains `contains` (empty matches all). Returns the number removed.
    async fn delete_where(&self, prefix: &str, contains: &str) -> Result<u64, RemoteError>;

    /// Counts live keys starting with `prefix`.
    async fn count(&self, prefix: &str) -> Result<u64, RemoteError>;
}
