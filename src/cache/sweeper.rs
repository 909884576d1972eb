// Package cache provides the periodic local expiry sweeper.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics;

use super::store::TieredCache;

/// Removes expired local entries every `each` until cancelled.
pub async fn run_sweeper(shutdown_token: CancellationToken, cache: Arc<TieredCache>, each: Duration) {
    let mut ticker = interval(each);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    info!(component = "sweeper", event = "started", every = ?each, "cache sweeper started");
    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!(component = "sweeper", event = "stopped", "cache sweeper stopped");
                return;
            }
            _ = ticker.tick() => {
                let swept = cache.sweep_expired();
                if swept > 0 {
                    metrics::add_swept(swept as u64);
                    debug!(component = "sweeper", event = "swept", swept, left = cache.local_len(), "expired entries removed");
                }
            }
        }
    }
}
