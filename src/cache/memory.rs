// Package cache provides an in-process remote tier.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::remote::{RemoteError, RemoteTier};

/// In-process stand-in for a shared cache with native expiry.
///
/// Used for single-process deployments that still want the second tier's
/// longer ttl, and by tests.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones included until next access.
    pub fn raw_len(&self) -> usize {
        self.entries.lock().len()
    }

    fn purge_expired(entries: &mut HashMap<String, (Value, Instant)>) {
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

#[async_trait::async_trait]
impl RemoteTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((payload, expires_at)) if *expires_at > Instant::now() => Ok(Some(payload.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, payload: &Value, ttl: Duration) -> Result<(), RemoteError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .insert(key.to_string(), (payload.clone(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RemoteError> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn delete_where(&self, prefix: &str, contains: &str) -> Result<u64, RemoteError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries);
        let before = entries.len();
        entries.retain(|key, _| match key.strip_prefix(prefix) {
            Some(rest) => !rest.contains(contains),
            None => true,
        });
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self, prefix: &str) -> Result<u64, RemoteError> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries);
        Ok(entries.keys().filter(|k| k.starts_with(prefix)).count() as u64)
    }
}
