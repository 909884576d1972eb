use super::{CacheSettings, Config, LeagueBox, Logs, Remote, RemoteMode, RuleSpec, Subscriptions, Tasks, TierTtl};
use crate::model::Category;
use std::collections::HashMap;
use std::time::Duration;

/// Creates a new test configuration.
///
/// Uses the in-process remote tier, short scheduler ticks and a small pool so
/// scenario tests stay fast.
pub fn new_test_config() -> Config {
    let mut ttl = HashMap::new();
    ttl.insert(
        Category::LeagueTable,
        TierTtl::new(Duration::from_secs(60), Duration::from_secs(600)),
    );
    ttl.insert(
        Category::MatchDetails,
        TierTtl::new(Duration::from_secs(30), Duration::from_secs(300)),
    );
    // Admin stats are never shared between processes.
    ttl.insert(
        Category::AdminStats,
        TierTtl::new(Duration::from_secs(10), Duration::ZERO),
    );

    let mut rules = HashMap::new();
    rules.insert(
        "score_update".to_string(),
        RuleSpec {
            categories: vec![Category::MatchDetails, Category::Results],
            identifier: Some("{home}_{away}".to_string()),
            broadcast: true,
        },
    );

    Config {
        league: LeagueBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            cache: Some(CacheSettings {
                key_prefix: Some("test:".to_string()),
                default_ttl: Some(TierTtl::new(Duration::from_secs(300), Duration::from_secs(1800))),
                ttl: Some(ttl),
                sweep_interval: Some(Duration::from_secs(5)),
                remote: Some(Remote {
                    mode: Some(RemoteMode::Memory),
                    url: None,
                    timeout: Some(Duration::from_millis(100)),
                }),
            }),
            tasks: Some(Tasks {
                workers: Some(2),
                queue_capacity: Some(64),
                history: Some(16),
                scheduler_interval: Some(Duration::from_millis(50)),
                max_retries: Some(2),
                retry_delay: Some(Duration::from_millis(100)),
                max_retry_delay: Some(Duration::from_secs(5)),
                stats_interval: Some(Duration::from_secs(60)),
            }),
            subscriptions: Some(Subscriptions {
                broadcast_fallback: Some(true),
            }),
            rules: Some(rules),
        },
    }
}
