// Environment-style configuration overrides.

use anyhow::{Context, Result};
use std::time::Duration;

use super::{CacheSettings, Config, Logs, Remote, RemoteMode, Subscriptions, Tasks, TierTtl};
use crate::model::Category;

pub const ENV_PREFIX: &str = "LEAGUE_";
pub const VAR_ENV: &str = "LEAGUE_CACHE_ENV";
pub const VAR_LOG_LEVEL: &str = "LEAGUE_CACHE_LOG_LEVEL";
pub const VAR_TASK_WORKERS: &str = "LEAGUE_TASK_WORKERS";
pub const VAR_TASK_QUEUE_CAPACITY: &str = "LEAGUE_TASK_QUEUE_CAPACITY";
pub const VAR_TASK_HISTORY: &str = "LEAGUE_TASK_HISTORY";
pub const VAR_REDIS_URL: &str = "LEAGUE_REDIS_URL";
pub const VAR_BROADCAST_FALLBACK: &str = "LEAGUE_SUBSCRIPTIONS_BROADCAST_FALLBACK";
/// Followed by the upper-cased category name, value is `<local>/<remote>`.
pub const VAR_TTL_PREFIX: &str = "LEAGUE_CACHE_TTL_";

impl Config {
    /// Builds configuration from defaults plus process environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`. Unset variables keep the
    /// current value.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let league = &mut self.league;

        if let Some(env) = lookup(VAR_ENV) {
            league.env = env;
        }
        if let Some(level) = lookup(VAR_LOG_LEVEL) {
            league.logs = Some(Logs { level: Some(level) });
        }

        if let Some(v) = lookup(VAR_TASK_WORKERS) {
            tasks(&mut league.tasks).workers = Some(parse_usize(VAR_TASK_WORKERS, &v)?);
        }
        if let Some(v) = lookup(VAR_TASK_QUEUE_CAPACITY) {
            tasks(&mut league.tasks).queue_capacity = Some(parse_usize(VAR_TASK_QUEUE_CAPACITY, &v)?);
        }
        if let Some(v) = lookup(VAR_TASK_HISTORY) {
            tasks(&mut league.tasks).history = Some(parse_usize(VAR_TASK_HISTORY, &v)?);
        }

        if let Some(url) = lookup(VAR_REDIS_URL).filter(|u| !u.trim().is_empty()) {
            let cache = league.cache.get_or_insert_with(CacheSettings::default);
            let remote = cache.remote.get_or_insert(Remote {
                mode: None,
                url: None,
                timeout: None,
            });
            remote.url = Some(url);
            remote.mode = Some(RemoteMode::Redis);
        }

        for category in Category::ALL {
            let name = format!("{}{}", VAR_TTL_PREFIX, category.as_str().to_ascii_uppercase());
            if let Some(v) = lookup(&name) {
                let ttl = parse_tier_ttl(&name, &v)?;
                let cache = league.cache.get_or_insert_with(CacheSettings::default);
                cache.ttl.get_or_insert_with(Default::default).insert(category, ttl);
            }
        }

        if let Some(v) = lookup(VAR_BROADCAST_FALLBACK) {
            let enabled = parse_bool(VAR_BROADCAST_FALLBACK, &v)?;
            league.subscriptions = Some(Subscriptions {
                broadcast_fallback: Some(enabled),
            });
        }

        Ok(())
    }
}

fn tasks(slot: &mut Option<Tasks>) -> &mut Tasks {
    slot.get_or_insert_with(Tasks::default)
}

fn parse_usize(name: &str, v: &str) -> Result<usize> {
    v.trim()
        .parse::<usize>()
        .with_context(|| format!("{} must be a non-negative integer, got {:?}", name, v))
}

fn parse_bool(name: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean, got {:?}", name, v),
    }
}

fn parse_duration(name: &str, v: &str) -> Result<Duration> {
    let v = v.trim();
    if v == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(v).with_context(|| format!("{} has invalid duration {:?}", name, v))
}

fn parse_tier_ttl(name: &str, v: &str) -> Result<TierTtl> {
    let (local, remote) = v
        .split_once('/')
        .with_context(|| format!("{} must look like <local>/<remote>, got {:?}", name, v))?;
    Ok(TierTtl::new(parse_duration(name, local)?, parse_duration(name, remote)?))
}
