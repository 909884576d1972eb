// Remote tier doubles for failure scenarios.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::{RemoteError, RemoteTier};

/// Remote tier whose every call fails as if the endpoint were down.
#[derive(Debug, Default)]
pub struct FailingRemote {
    calls: AtomicU64,
}

impl FailingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, RemoteError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(RemoteError::Unavailable("connection refused".into()))
    }
}

#[async_trait::async_trait]
impl RemoteTier for FailingRemote {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>, RemoteError> {
        self.fail()
    }

    async fn set(&self, _key: &str, _payload: &Value, _ttl: Duration) -> Result<(), RemoteError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<bool, RemoteError> {
        self.fail()
    }

    async fn delete_where(&self, _prefix: &str, _contains: &str) -> Result<u64, RemoteError> {
        self.fail()
    }

    async fn count(&self, _prefix: &str) -> Result<u64, RemoteError> {
        self.fail()
    }
}

/// Remote tier that never answers within any reasonable timeout.
#[derive(Debug)]
pub struct StallingRemote {
    pub stall: Duration,
}

impl StallingRemote {
    pub fn new(stall: Duration) -> Self {
        Self { stall }
    }
}

#[async_trait::async_trait]
impl RemoteTier for StallingRemote {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>, RemoteError> {
        tokio::time::sleep(self.stall).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _payload: &Value, _ttl: Duration) -> Result<(), RemoteError> {
        tokio::time::sleep(self.stall).await;
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, RemoteError> {
        tokio::time::sleep(self.stall).await;
        Ok(false)
    }

    async fn delete_where(&self, _prefix: &str, _contains: &str) -> Result<u64, RemoteError> {
        tokio::time::sleep(self.stall).await;
        Ok(0)
    }

    async fn count(&self, _prefix: &str) -> Result<u64, RemoteError> {
        tokio::time::sleep(self.stall).await;
        Ok(0)
    }
}
