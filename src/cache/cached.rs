// Package cache wraps loaders with read-through caching.

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use crate::model::Category;

use super::store::TieredCache;

/// Read-through call: serve from cache, otherwise run `loader` and store.
pub async fn cached<F, Fut>(
    cache: &TieredCache,
    category: Category,
    identifier: Option<&str>,
    loader: F,
) -> Option<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<Value>>>,
{
    cache.get_or_load(category, identifier, loader).await
}

/// Typed read-through loader bound to one category.
///
/// Values are stored as json. A cached payload that no longer decodes into
/// `T` is dropped and reloaded.
pub struct CachedLoader<T> {
    cache: Arc<TieredCache>,
    category: Category,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for CachedLoader<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            category: self.category,
            _marker: PhantomData,
        }
    }
}

impl<T> CachedLoader<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(cache: Arc<TieredCache>, category: Category) -> Self {
        Self {
            cache,
            category,
            _marker: PhantomData,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub async fn load<F, Fut>(&self, identifier: Option<&str>, loader: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        if let Some(hit) = self.cache.get(self.category, identifier).await {
            match serde_json::from_value::<T>(hit) {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(component = "cache", event = "decode_failed", category = %self.category, error = %e, "stale payload shape, reloading");
                    self.cache.invalidate(self.category, identifier).await;
                }
            }
        }

        let outcome = AssertUnwindSafe(async move { loader().await })
            .catch_unwind()
            .await;
        let value = match outcome {
            Ok(Ok(Some(value))) => value,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                self.cache.count_load(false);
                warn!(component = "cache", event = "load_failed", category = %self.category, error = %e, "loader failed");
                return None;
            }
            Err(_) => {
                self.cache.count_load(false);
                warn!(component = "cache", event = "load_panicked", category = %self.category, "loader panicked");
                return None;
            }
        };
        self.cache.count_load(true);
        match serde_json::to_value(&value) {
            Ok(payload) => self.cache.set(self.category, payload, identifier).await,
            Err(e) => {
                warn!(component = "cache", event = "encode_failed", category = %self.category, error = %e, "value not cached");
            }
        }
        Some(value)
    }

    pub async fn invalidate(&self, identifier: Option<&str>) -> usize {
        self.cache.invalidate(self.category, identifier).await
    }
}
