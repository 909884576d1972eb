// Core wiring: one instance of each component built from configuration.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{self, CacheStats, MemoryTier, RedisTier, RemoteTier, TieredCache};
use crate::config::{Config, ConfigTrait, RemoteMode};
use crate::dedlog;
use crate::invalidation::{Invalidator, InvalidatorStats};
use crate::notify::{Notifier, RegistryStats, SubscriptionRegistry};
use crate::tasks::{TaskManager, TaskStats};

/// Point-in-time view across all components.
#[derive(Debug, Clone, Serialize)]
pub struct CoreStats {
    pub cache: CacheStats,
    pub tasks: TaskStats,
    pub subscriptions: RegistryStats,
    pub invalidations: InvalidatorStats,
}

/// Owns the cache, the invalidator, the subscription registry and the task
/// manager, plus their background loops.
pub struct Core {
    cfg: Config,
    shutdown_token: CancellationToken,
    cache: Arc<TieredCache>,
    invalidator: Arc<Invalidator>,
    subscriptions: Arc<SubscriptionRegistry>,
    tasks: Arc<TaskManager>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Core {
    /// Builds and starts every component. Never fails: a remote tier that
    /// cannot be reached leaves the cache local-only.
    pub async fn new(cfg: Config, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        let shutdown_token = CancellationToken::new();
        let mut background = Vec::new();

        background.push(tokio::spawn(dedlog::start_dedup_logger(
            shutdown_token.clone(),
            dedlog::consts::DEFAULT_WINDOW,
        )));

        let remote = connect_remote(&cfg).await;
        let cache = Arc::new(TieredCache::from_config(&cfg, remote));
        let invalidator = Arc::new(Invalidator::from_config(&cfg, cache.clone(), Some(notifier.clone())));
        let subscriptions = Arc::new(SubscriptionRegistry::from_config(&cfg, notifier));

        let settings = cfg.tasks();
        let workers = settings.workers;
        let tasks = Arc::new(TaskManager::new(shutdown_token.clone(), settings));
        tasks.start(workers);

        if let Some(every) = cfg.sweep_interval() {
            background.push(tokio::spawn(cache::run_sweeper(
                shutdown_token.clone(),
                cache.clone(),
                every,
            )));
        }

        info!(
            component = "core",
            event = "started",
            env = %cfg.league.env,
            remote = cache.has_remote(),
            workers,
            "league core started"
        );

        Arc::new(Self {
            cfg,
            shutdown_token,
            cache,
            invalidator,
            subscriptions,
            tasks,
            background: Mutex::new(background),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn invalidator(&self) -> &Arc<Invalidator> {
        &self.invalidator
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn stats(&self) -> CoreStats {
        CoreStats {
            cache: self.cache.stats().await,
            tasks: self.tasks.get_stats(),
            subscriptions: self.subscriptions.stats(),
            invalidations: self.invalidator.stats(),
        }
    }

    /// Stops the task pool and the background loops within `timeout`.
    /// Returns whether everything exited on its own.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        self.subscriptions.log_stats();
        let mut clean = self.tasks.stop(timeout).await;

        self.shutdown_token.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background.lock());
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    clean = false;
                    error!(component = "core", event = "join_failed", error = %e, "background loop ended abnormally");
                }
                Err(_) => {
                    clean = false;
                    handle.abort();
                }
            }
        }

        if clean {
            info!(component = "core", event = "stopped", "league core stopped");
        } else {
            warn!(component = "core", event = "stopped", timeout = ?timeout, "league core stopped, some loops aborted");
        }
        clean
    }
}

/// Builds the remote tier the config asks for.
async fn connect_remote(cfg: &Config) -> Option<Arc<dyn RemoteTier>> {
    match cfg.remote_mode() {
        RemoteMode::Off => {
            info!(component = "core", event = "remote_off", "no remote tier, local cache only");
            None
        }
        RemoteMode::Memory => Some(Arc::new(MemoryTier::new())),
        RemoteMode::Redis => {
            let Some(url) = cfg.remote().and_then(|r| r.url.as_deref()) else {
                warn!(component = "core", event = "remote_unconfigured", "redis mode without url, local cache only");
                return None;
            };
            match tokio::time::timeout(cfg.remote_timeout() * 4, RedisTier::connect(url)).await {
                Ok(Ok(tier)) => Some(Arc::new(tier)),
                Ok(Err(e)) => {
                    warn!(component = "core", event = "remote_unavailable", error = %e, "redis unreachable, local cache only");
                    None
                }
                Err(_) => {
                    warn!(component = "core", event = "remote_unavailable", "redis connect timed out, local cache only");
                    None
                }
            }
        }
    }
}

/// Builds the [`Core`] on first use and hands out the same instance after.
pub struct CoreFactory {
    cfg: Config,
    notifier: Arc<dyn Notifier>,
    cell: OnceCell<Arc<Core>>,
}

impl CoreFactory {
    pub fn new(cfg: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cfg,
            notifier,
            cell: OnceCell::new(),
        }
    }

    /// Returns the core, building it if this is the first call. Concurrent
    /// first calls build it once.
    pub async fn get(&self) -> Arc<Core> {
        self.cell
            .get_or_init(|| Core::new(self.cfg.clone(), self.notifier.clone()))
            .await
            .clone()
    }

    /// The core if it was already built.
    pub fn get_if_built(&self) -> Option<Arc<Core>> {
        self.cell.get().cloned()
    }
}
