// Package cache provides the redis-backed remote tier.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::info;

use super::remote::{RemoteError, RemoteTier};

const SCAN_BATCH: usize = 500;

/// Remote tier over a redis `ConnectionManager` (auto reconnecting).
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    url: String,
}

impl fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTier")
            .field("url", &self.url)
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisTier {
    /// Connects to the endpoint, failing if it is unreachable right now.
    pub async fn connect(url: &str) -> Result<Self, RemoteError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(component = "cache", tier = "redis", event = "connected", "remote tier connected");
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    /// Collects every key matching the glob with non-blocking SCAN.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, RemoteError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            found.extend(keys);
            if next == 0 {
                return Ok(found);
            }
            cursor = next;
        }
    }
}

#[async_trait::async_trait]
impl RemoteTier for RedisTier {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, payload: &Value, ttl: Duration) -> Result<(), RemoteError> {
        let millis = ttl.as_millis().max(1) as u64;
        let raw = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RemoteError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_where(&self, prefix: &str, contains: &str) -> Result<u64, RemoteError> {
        let pattern = format!("{}*{}*", escape_glob(prefix), escape_glob(contains));
        let keys = self.scan(&pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut removed = 0u64;
        for chunk in keys.chunks(SCAN_BATCH) {
            let n: i64 = conn.del(chunk).await?;
            removed += n.max(0) as u64;
        }
        Ok(removed)
    }

    async fn count(&self, prefix: &str) -> Result<u64, RemoteError> {
        let pattern = format!("{}*", escape_glob(prefix));
        Ok(self.scan(&pattern).await?.len() as u64)
    }
}

/// Escapes redis glob metacharacters so the text matches literally.
pub(crate) fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
