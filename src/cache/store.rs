//! Two-tier cache store: in-process map in front of a shared remote tier.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, ConfigTrait, DEFAULT_KEY_PREFIX, DEFAULT_REMOTE_TIMEOUT};
use crate::dedlog;
use crate::metrics;
use crate::model::{belongs_to, scoped_prefix, CacheKey, Category, Entry};

use super::remote::{RemoteError, RemoteTier};
use super::ttl::TtlPolicy;

/// Entry counts per tier. `remote_entries` is None without a reachable remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub local_entries: usize,
    pub remote_entries: Option<u64>,
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_errors: u64,
    pub remote_errors: u64,
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
    remote_errors: AtomicU64,
}

/// Tiered cache store.
///
/// Reads go local, then remote, then the caller's loader. Remote failures
/// are logged and treated as misses; nothing here fails the caller.
pub struct TieredCache {
    ttl: TtlPolicy,
    local: Mutex<HashMap<String, Entry>>,
    remote: Option<Arc<dyn RemoteTier>>,
    key_prefix: String,
    remote_timeout: Duration,
    counters: Counters,
}

impl TieredCache {
    /// Creates a store with an explicit ttl policy.
    pub fn new(ttl: TtlPolicy, remote: Option<Arc<dyn RemoteTier>>) -> Self {
        Self {
            ttl,
            local: Mutex::new(HashMap::new()),
            remote,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            counters: Counters::default(),
        }
    }

    /// Creates a store wired from configuration.
    pub fn from_config(cfg: &Config, remote: Option<Arc<dyn RemoteTier>>) -> Self {
        Self::new(TtlPolicy::from_config(cfg), remote)
            .with_key_prefix(cfg.key_prefix())
            .with_remote_timeout(cfg.remote_timeout())
    }

    /// Namespace prepended to every remote key.
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Upper bound for any single remote call.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Reads a payload without loading on miss.
    pub async fn get(&self, category: Category, identifier: Option<&str>) -> Option<Value> {
        let key = self.key(category, identifier)?;
        let hit = self.lookup(&key).await;
        if hit.is_none() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            metrics::add_misses(1);
        }
        hit
    }

    /// Reads a payload, calling `loader` when both tiers miss.
    ///
    /// The loaded value is stored at each tier whose ttl is non-zero. A loader
    /// error, panic or `None` leaves the cache untouched and yields `None`.
    pub async fn get_or_load<F, Fut>(
        &self,
        category: Category,
        identifier: Option<&str>,
        loader: F,
    ) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<Value>>>,
    {
        let key = match CacheKey::new(category, identifier) {
            Ok(key) => key,
            Err(e) => {
                // Still serve the caller, just bypass both tiers
                warn!(component = "cache", event = "invalid_identifier", error = %e, "serving loader uncached");
                return self.run_loader(category, loader).await;
            }
        };

        if let Some(hit) = self.lookup(&key).await {
            return Some(hit);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::add_misses(1);

        let payload = self.run_loader(category, loader).await?;
        self.store(&key, &payload).await;
        Some(payload)
    }

    /// Writes a payload to both tiers, honouring per-tier ttls.
    pub async fn set(&self, category: Category, payload: Value, identifier: Option<&str>) {
        if let Some(key) = self.key(category, identifier) {
            self.store(&key, &payload).await;
        }
    }

    /// Evicts exactly one entry (the unscoped one when `identifier` is None).
    /// Returns the number of keys removed across tiers.
    pub async fn invalidate(&self, category: Category, identifier: Option<&str>) -> usize {
        let Some(key) = self.key(category, identifier) else {
            return 0;
        };
        let rendered = key.render();
        let mut removed = usize::from(self.local.lock().remove(&rendered).is_some());

        if let Some(remote) = &self.remote {
            let full = self.remote_key(&rendered);
            if let Some(true) = self
                .remote_call("remote cache delete failed", &full, remote.delete(&full))
                .await
            {
                removed += 1;
            }
        }

        debug!(component = "cache", event = "invalidate", key = %rendered, removed, "entry invalidated");
        metrics::add_invalidated(removed as u64);
        removed
    }

    /// Evicts the unscoped entry and every scoped entry of the category.
    pub async fn invalidate_category(&self, category: Category) -> usize {
        let mut removed = {
            let mut local = self.local.lock();
            let before = local.len();
            local.retain(|k, _| !belongs_to(k, category));
            before - local.len()
        };

        if let Some(remote) = &self.remote {
            let unscoped = self.remote_key(category.as_str());
            if let Some(true) = self
                .remote_call("remote cache delete failed", &unscoped, remote.delete(&unscoped))
                .await
            {
                removed += 1;
            }
            let prefix = self.remote_key(&scoped_prefix(category));
            if let Some(n) = self
                .remote_call("remote cache bulk delete failed", &prefix, remote.delete_where(&prefix, ""))
                .await
            {
                removed += n as usize;
            }
        }

        debug!(component = "cache", event = "invalidate_category", category = %category, removed, "category invalidated");
        metrics::add_invalidated(removed as u64);
        removed
    }

    /// Evicts every key containing `pattern` at both tiers. Returns the total
    /// number of keys removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        if pattern.is_empty() {
            warn!(component = "cache", event = "invalidate_pattern", "empty pattern refused");
            return 0;
        }

        let mut removed = {
            let mut local = self.local.lock();
            let before = local.len();
            local.retain(|k, _| !k.contains(pattern));
            before - local.len()
        };

        if let Some(remote) = &self.remote {
            if let Some(n) = self
                .remote_call(
                    "remote cache pattern delete failed",
                    pattern,
                    remote.delete_where(&self.key_prefix, pattern),
                )
                .await
            {
                removed += n as usize;
            }
        }

        debug!(component = "cache", event = "invalidate_pattern", pattern, removed, "pattern invalidated");
        metrics::add_invalidated(removed as u64);
        removed
    }

    /// Drops everything this store owns at both tiers.
    pub async fn clear(&self) -> usize {
        let mut removed = {
            let mut local = self.local.lock();
            let n = local.len();
            local.clear();
            n
        };
        if let Some(remote) = &self.remote {
            if let Some(n) = self
                .remote_call(
                    "remote cache clear failed",
                    &self.key_prefix,
                    remote.delete_where(&self.key_prefix, ""),
                )
                .await
            {
                removed += n as usize;
            }
        }
        removed
    }

    /// Removes local entries older than their category's local ttl.
    pub fn sweep_expired(&self) -> usize {
        let mut local = self.local.lock();
        let before = local.len();
        local.retain(|k, entry| match CacheKey::parse(k) {
            Some(key) => entry.is_alive(self.ttl.local(key.category())),
            None => false,
        });
        let swept = before - local.len();
        metrics::set_local_length(local.len());
        swept
    }

    /// Number of local entries, expired ones included until swept.
    pub fn local_len(&self) -> usize {
        self.local.lock().len()
    }

    /// Entry counts and read counters.
    pub async fn stats(&self) -> CacheStats {
        let local_entries = self.local_len();
        let remote_entries = match &self.remote {
            Some(remote) => {
                self.remote_call("remote cache count failed", &self.key_prefix, remote.count(&self.key_prefix))
                    .await
            }
            None => None,
        };
        CacheStats {
            local_entries,
            remote_entries,
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_errors: self.counters.load_errors.load(Ordering::Relaxed),
            remote_errors: self.counters.remote_errors.load(Ordering::Relaxed),
        }
    }

    fn key(&self, category: Category, identifier: Option<&str>) -> Option<CacheKey> {
        match CacheKey::new(category, identifier) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(component = "cache", event = "invalid_identifier", error = %e, "cache operation skipped");
                None
            }
        }
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Local then remote. A remote hit back-fills the local tier.
    async fn lookup(&self, key: &CacheKey) -> Option<Value> {
        let category = key.category();
        let local_ttl = self.ttl.local(category);
        let rendered = key.render();

        {
            let mut local = self.local.lock();
            match local.get(&rendered) {
                Some(entry) if entry.is_alive(local_ttl) => {
                    self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    metrics::add_local_hits(1);
                    return Some(entry.payload().clone());
                }
                Some(_) => {
                    local.remove(&rendered);
                }
                None => {}
            }
        }

        let remote = self.remote.as_ref()?;
        if self.ttl.remote(category).is_zero() {
            return None;
        }
        let full = self.remote_key(&rendered);
        let payload = self
            .remote_call("remote cache get failed", &full, remote.get(&full))
            .await
            .flatten()?;

        self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
        metrics::add_remote_hits(1);
        if !local_ttl.is_zero() {
            self.local.lock().insert(rendered, Entry::new(payload.clone()));
        }
        Some(payload)
    }

    async fn store(&self, key: &CacheKey, payload: &Value) {
        let ttl = self.ttl.for_category(key.category());
        let rendered = key.render();

        if !ttl.local.is_zero() {
            self.local.lock().insert(rendered.clone(), Entry::new(payload.clone()));
        }

        if let Some(remote) = &self.remote {
            if !ttl.remote.is_zero() {
                let full = self.remote_key(&rendered);
                self.remote_call("remote cache set failed", &full, remote.set(&full, payload, ttl.remote))
                    .await;
            }
        }
    }

    async fn run_loader<F, Fut>(&self, category: Category, loader: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<Value>>>,
    {
        let outcome = AssertUnwindSafe(async move { loader().await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(Some(payload))) => {
                self.count_load(true);
                Some(payload)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                self.count_load(false);
                warn!(component = "cache", event = "load_failed", category = %category, error = %e, "loader failed");
                None
            }
            Err(_) => {
                self.count_load(false);
                warn!(component = "cache", event = "load_panicked", category = %category, "loader panicked");
                None
            }
        }
    }

    /// Counts one loader outcome.
    pub(super) fn count_load(&self, ok: bool) {
        if ok {
            self.counters.loads.fetch_add(1, Ordering::Relaxed);
            metrics::add_loads(1, 0);
        } else {
            self.counters.load_errors.fetch_add(1, Ordering::Relaxed);
            metrics::add_loads(0, 1);
        }
    }

    /// Bounds a remote call by the timeout and swallows its failure.
    async fn remote_call<T, Fut>(&self, reason: &'static str, key: &str, call: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let err = match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => RemoteError::Timeout(self.remote_timeout),
        };
        self.counters.remote_errors.fetch_add(1, Ordering::Relaxed);
        metrics::add_remote_errors(1);
        dedlog::err(Some(&err), Some(&self.error_context(key)), reason);
        None
    }

    /// Tier and key attached to remote failure logs.
    pub(super) fn error_context(&self, key: &str) -> String {
        let tier = self.remote.as_ref().map_or("none", |r| r.name());
        format!("tier={} key={}", tier, key)
    }
}
