// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::invalidation::IdentifierTemplate;
use crate::model::Category;

mod env;

pub use env::{ENV_PREFIX, VAR_BROADCAST_FALLBACK, VAR_ENV, VAR_LOG_LEVEL, VAR_REDIS_URL,
    VAR_TASK_HISTORY, VAR_TASK_QUEUE_CAPACITY, VAR_TASK_WORKERS, VAR_TTL_PREFIX};

pub const PROD: &str = "prod";
pub const DEV: &str = "dev";
pub const TEST: &str = "test";

pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_KEY_PREFIX: &str = "league:";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_HISTORY_LEN: usize = 100;
pub const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "league")]
    pub league: LeagueBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeagueBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub cache: Option<CacheSettings>,
    pub tasks: Option<Tasks>,
    pub subscriptions: Option<Subscriptions>,
    pub rules: Option<HashMap<String, RuleSpec>>,
}

impl Default for LeagueBox {
    fn default() -> Self {
        Self {
            env: DEV.to_string(),
            logs: None,
            cache: None,
            tasks: None,
            subscriptions: None,
            rules: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

/// Local and remote tier ttl of one category. Zero skips the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierTtl {
    #[serde(with = "humantime_serde")]
    pub local: Duration,
    #[serde(with = "humantime_serde")]
    pub remote: Duration,
}

impl TierTtl {
    pub const fn new(local: Duration, remote: Duration) -> Self {
        Self { local, remote }
    }
}

impl Default for TierTtl {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_TTL, DEFAULT_REMOTE_TTL)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(rename = "key_prefix")]
    pub key_prefix: Option<String>,
    #[serde(rename = "default_ttl")]
    pub default_ttl: Option<TierTtl>,
    pub ttl: Option<HashMap<Category, TierTtl>>,
    #[serde(rename = "sweep_interval", default, with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
    pub remote: Option<Remote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    Off,    // local tier only
    Memory, // in-process shared tier
    Redis,  // redis endpoint from url
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Remote {
    pub mode: Option<RemoteMode>,
    pub url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Tasks {
    pub workers: Option<usize>,
    #[serde(rename = "queue_capacity")]
    pub queue_capacity: Option<usize>,
    pub history: Option<usize>,
    #[serde(rename = "scheduler_interval", default, with = "humantime_serde")]
    pub scheduler_interval: Option<Duration>,
    #[serde(rename = "max_retries")]
    pub max_retries: Option<u32>,
    #[serde(rename = "retry_delay", default, with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
    #[serde(rename = "max_retry_delay", default, with = "humantime_serde")]
    pub max_retry_delay: Option<Duration>,
    #[serde(rename = "stats_interval", default, with = "humantime_serde")]
    pub stats_interval: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subscriptions {
    #[serde(rename = "broadcast_fallback")]
    pub broadcast_fallback: Option<bool>,
}

/// Invalidation rule as declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    pub categories: Vec<Category>,
    pub identifier: Option<String>,
    #[serde(default)]
    pub broadcast: bool,
}

/// Resolved task manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub history: usize,
    pub scheduler_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub stats_interval: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history: DEFAULT_HISTORY_LEN,
            scheduler_interval: DEFAULT_SCHEDULER_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// Small fixed pool: between 2 and 8 workers depending on cores.
fn default_workers() -> usize {
    num_cpus::get().clamp(2, 8)
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    fn is_dev(&self) -> bool;
    fn is_test(&self) -> bool;
    fn key_prefix(&self) -> &str;
    fn ttl(&self, category: Category) -> TierTtl;
    fn sweep_interval(&self) -> Option<Duration>;
    fn remote(&self) -> Option<&Remote>;
    fn remote_mode(&self) -> RemoteMode;
    fn remote_timeout(&self) -> Duration;
    fn tasks(&self) -> TaskSettings;
    fn broadcast_fallback(&self) -> bool;
    fn rules(&self) -> Vec<(String, RuleSpec)>;
}

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.league.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.league.env == PROD
    }

    fn is_dev(&self) -> bool {
        self.league.env == DEV
    }

    fn is_test(&self) -> bool {
        self.league.env == TEST
    }

    fn key_prefix(&self) -> &str {
        self.league
            .cache
            .as_ref()
            .and_then(|c| c.key_prefix.as_deref())
            .unwrap_or(DEFAULT_KEY_PREFIX)
    }

    fn ttl(&self, category: Category) -> TierTtl {
        let cache = match self.league.cache.as_ref() {
            Some(cache) => cache,
            None => return TierTtl::default(),
        };
        cache
            .ttl
            .as_ref()
            .and_then(|table| table.get(&category).copied())
            .or(cache.default_ttl)
            .unwrap_or_default()
    }

    fn sweep_interval(&self) -> Option<Duration> {
        let interval = self
            .league
            .cache
            .as_ref()
            .and_then(|c| c.sweep_interval)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        (!interval.is_zero()).then_some(interval)
    }

    fn remote(&self) -> Option<&Remote> {
        self.league.cache.as_ref().and_then(|c| c.remote.as_ref())
    }

    fn remote_mode(&self) -> RemoteMode {
        match self.remote() {
            None => RemoteMode::Off,
            Some(remote) => match remote.mode {
                Some(mode) => mode,
                None if remote.url.is_some() => RemoteMode::Redis,
                None => RemoteMode::Off,
            },
        }
    }

    fn remote_timeout(&self) -> Duration {
        self.remote()
            .and_then(|r| r.timeout)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT)
    }

    fn tasks(&self) -> TaskSettings {
        let defaults = TaskSettings::default();
        let Some(t) = self.league.tasks.as_ref() else {
            return defaults;
        };
        TaskSettings {
            workers: t.workers.filter(|n| *n > 0).unwrap_or(defaults.workers),
            queue_capacity: t.queue_capacity.filter(|n| *n > 0).unwrap_or(defaults.queue_capacity),
            history: t.history.unwrap_or(defaults.history),
            scheduler_interval: t
                .scheduler_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.scheduler_interval),
            max_retries: t.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: t.retry_delay.unwrap_or(defaults.retry_delay),
            max_retry_delay: t.max_retry_delay.unwrap_or(defaults.max_retry_delay),
            stats_interval: t.stats_interval.unwrap_or(defaults.stats_interval),
        }
    }

    fn broadcast_fallback(&self) -> bool {
        self.league
            .subscriptions
            .as_ref()
            .and_then(|s| s.broadcast_fallback)
            .unwrap_or(true)
    }

    fn rules(&self) -> Vec<(String, RuleSpec)> {
        let mut rules: Vec<(String, RuleSpec)> = self
            .league
            .rules
            .as_ref()
            .map(|r| r.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        rules
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let cfg = Self::from_yaml(&data)
            .with_context(|| format!("unmarshal yaml from {:?}", abs_path))?;

        Ok(cfg)
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if let Some(remote) = self.remote() {
            if remote.mode == Some(RemoteMode::Redis) && remote.url.is_none() {
                anyhow::bail!("cache.remote.mode is redis but no url configured");
            }
        }
        if let Some(rules) = self.league.rules.as_ref() {
            for (change_type, rule) in rules {
                if rule.categories.is_empty() {
                    anyhow::bail!("rule {:?} declares no categories", change_type);
                }
                if let Some(template) = rule.identifier.as_deref() {
                    IdentifierTemplate::parse(template)
                        .with_context(|| format!("rule {:?} identifier", change_type))?;
                }
            }
        }
        Ok(())
    }
}

// Test config is always available for integration tests
mod test_config;
pub use test_config::new_test_config;
