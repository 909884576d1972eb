// Package tasks provides inline retry for calls that are not queued.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::backoff::Backoff;

/// Attempts and backoff of an inline retried call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::new(base, max),
        }
    }
}

/// Runs `op` until it succeeds or `max_retries` retries are spent, sleeping
/// the backoff delay in between. Returns the last error.
pub async fn with_retry<F, Fut, T, E>(name: &str, policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retry < policy.max_retries => {
                let delay = policy.backoff.delay_for(retry);
                warn!(component = "retry", event = "retrying", name, retry, delay = ?delay, error = %e, "call failed, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
