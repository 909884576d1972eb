#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::{cached, CachedLoader, MemoryTier, RemoteTier, TieredCache};
    use crate::config;
    use crate::model::Category;
    use crate::support::{FailingRemote, StallingRemote};

    fn new_cache() -> (TieredCache, Arc<MemoryTier>) {
        let remote = Arc::new(MemoryTier::new());
        let cache = TieredCache::from_config(
            &config::new_test_config(),
            Some(remote.clone() as Arc<dyn RemoteTier>),
        );
        (cache, remote)
    }

    /// Test that set followed by get returns the payload without a loader.
    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = new_cache();
        cache
            .set(Category::MatchDetails, json!({"score": "2:1"}), Some("A_B"))
            .await;

        let calls = AtomicUsize::new(0);
        let got = cache
            .get_or_load(Category::MatchDetails, Some("A_B"), || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(Some(json!("loaded")))
            })
            .await;

        assert_eq!(got, Some(json!({"score": "2:1"})));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(cache.get(Category::MatchDetails, None).await, None);
    }

    /// Test that a loaded value suppresses later loaders and lands in both tiers.
    #[tokio::test]
    async fn test_loader_result_suppresses_next_loader() {
        let (cache, remote) = new_cache();

        let first = cache
            .get_or_load(Category::LeagueTable, Some(""), || async { Ok(Some(json!([1, 2, 3]))) })
            .await;
        assert_eq!(first, Some(json!([1, 2, 3])));
        assert_eq!(cache.local_len(), 1);
        assert_eq!(remote.get("test:league_table").await.unwrap(), Some(json!([1, 2, 3])));

        let second = cache
            .get_or_load(Category::LeagueTable, Some(""), || async { Ok(Some(json!([9, 9, 9]))) })
            .await;
        assert_eq!(second, Some(json!([1, 2, 3])));
    }

    /// Test that the local tier stops serving once its ttl elapses.
    #[tokio::test(start_paused = true)]
    async fn test_local_ttl_expiry_reconsults_remote() {
        let (cache, remote) = new_cache();
        cache.set(Category::MatchDetails, json!(1), Some("A_B")).await;

        // local ttl is 30s, remote 300s
        tokio::time::advance(Duration::from_secs(31)).await;
        remote
            .set("test:match_details:A_B", &json!(2), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(cache.get(Category::MatchDetails, Some("A_B")).await, Some(json!(2)));
        let stats = cache.stats().await;
        assert_eq!(stats.remote_hits, 1);
        assert_eq!(stats.local_hits, 0);
    }

    /// Test that an expired entry with nothing remote goes to the loader.
    #[tokio::test(start_paused = true)]
    async fn test_expired_everywhere_calls_loader() {
        let (cache, _) = new_cache();
        cache.set(Category::AdminStats, json!("old"), None).await;
        assert_eq!(cache.get(Category::AdminStats, None).await, Some(json!("old")));

        // admin stats: 10s local, never remote
        tokio::time::advance(Duration::from_secs(11)).await;
        let got = cache
            .get_or_load(Category::AdminStats, None, || async { Ok(Some(json!("fresh"))) })
            .await;
        assert_eq!(got, Some(json!("fresh")));
    }

    /// Test that a zero remote ttl keeps the category out of the remote tier.
    #[tokio::test]
    async fn test_zero_ttl_skips_tier() {
        let (cache, remote) = new_cache();
        cache.set(Category::AdminStats, json!({"users": 10}), None).await;

        assert_eq!(remote.raw_len(), 0);
        assert_eq!(cache.local_len(), 1);
    }

    /// Test that invalidate evicts the key at both tiers.
    #[tokio::test]
    async fn test_invalidate_then_miss() {
        let (cache, remote) = new_cache();
        cache.set(Category::Results, json!([1]), Some("A_B")).await;

        assert_eq!(cache.invalidate(Category::Results, Some("A_B")).await, 2);
        assert_eq!(cache.get(Category::Results, Some("A_B")).await, None);
        assert_eq!(remote.raw_len(), 0);
    }

    /// Test that unscoped invalidation spares scoped keys and category
    /// invalidation does not.
    #[tokio::test]
    async fn test_invalidate_unscoped_vs_category() {
        let (cache, _) = new_cache();
        cache.set(Category::Results, json!("all"), None).await;
        cache.set(Category::Results, json!("one"), Some("A_B")).await;
        cache.set(Category::Schedule, json!("s"), None).await;

        assert_eq!(cache.invalidate(Category::Results, None).await, 2);
        assert_eq!(cache.get(Category::Results, Some("A_B")).await, Some(json!("one")));

        cache.set(Category::Results, json!("all"), None).await;
        assert_eq!(cache.invalidate_category(Category::Results).await, 4);
        assert_eq!(cache.get(Category::Results, Some("A_B")).await, None);
        assert_eq!(cache.get(Category::Schedule, None).await, Some(json!("s")));
    }

    /// Test that pattern invalidation counts removals across both tiers.
    #[tokio::test]
    async fn test_invalidate_pattern_counts() {
        let (cache, remote) = new_cache();
        cache.set(Category::MatchDetails, json!(1), Some("home_away")).await;
        cache.set(Category::Results, json!(2), Some("home_away")).await;
        cache.set(Category::Results, json!(3), Some("other")).await;
        // local only
        cache.set(Category::AdminStats, json!(4), Some("home_away")).await;

        assert_eq!(cache.invalidate_pattern("home_away").await, 5);
        assert_eq!(cache.local_len(), 1);
        assert_eq!(remote.raw_len(), 1);
        assert_eq!(cache.invalidate_pattern("").await, 0);
    }

    /// Test that stats reports both tiers.
    #[tokio::test]
    async fn test_stats() {
        let (cache, _) = new_cache();
        cache.set(Category::Schedule, json!(1), None).await;
        cache.set(Category::AdminStats, json!(2), None).await;

        let stats = cache.stats().await;
        assert_eq!(stats.local_entries, 2);
        assert_eq!(stats.remote_entries, Some(1));

        let local_only = TieredCache::from_config(&config::new_test_config(), None);
        assert_eq!(local_only.stats().await.remote_entries, None);
    }

    /// Test that sweeping removes only entries past their local ttl.
    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let (cache, _) = new_cache();
        cache.set(Category::AdminStats, json!(1), None).await;
        cache.set(Category::LeagueTable, json!(2), None).await;

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.local_len(), 1);
    }

    /// Test that a down remote degrades to local-only without surfacing errors.
    #[tokio::test]
    async fn test_failing_remote_degrades_to_local() {
        let remote = Arc::new(FailingRemote::new());
        let cache = TieredCache::from_config(
            &config::new_test_config(),
            Some(remote.clone() as Arc<dyn RemoteTier>),
        );

        let got = cache
            .get_or_load(Category::Schedule, None, || async { Ok(Some(json!(["fixture"]))) })
            .await;
        assert_eq!(got, Some(json!(["fixture"])));
        assert_eq!(cache.get(Category::Schedule, None).await, Some(json!(["fixture"])));
        assert_eq!(cache.invalidate(Category::Schedule, None).await, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.remote_entries, None);
        assert!(stats.remote_errors >= 3);
        assert!(remote.calls() >= 3);
    }

    /// Test that a stalled remote is cut off by the remote timeout.
    #[tokio::test(start_paused = true)]
    async fn test_stalled_remote_times_out() {
        let remote = Arc::new(StallingRemote::new(Duration::from_secs(3600)));
        let cache = TieredCache::from_config(&config::new_test_config(), Some(remote as Arc<dyn RemoteTier>));

        let started = tokio::time::Instant::now();
        let got = cache
            .get_or_load(Category::Results, None, || async { Ok(Some(json!(1))) })
            .await;
        assert_eq!(got, Some(json!(1)));
        // one timed out get and one timed out set, 100ms each
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Test that failing, empty and panicking loaders all yield absence.
    #[tokio::test]
    async fn test_loader_failures_yield_none() {
        let (cache, _) = new_cache();

        let failed = cache
            .get_or_load(Category::UserBets, Some("7"), || async { Err(anyhow::anyhow!("db down")) })
            .await;
        assert_eq!(failed, None);

        let empty = cache
            .get_or_load(Category::UserBets, Some("7"), || async { Ok(None) })
            .await;
        assert_eq!(empty, None);

        let panicked = cache
            .get_or_load(Category::UserBets, Some("7"), || async {
                if true {
                    panic!("loader bug");
                }
                Ok(Some(Value::Null))
            })
            .await;
        assert_eq!(panicked, None);
        assert_eq!(cache.local_len(), 0);
        assert_eq!(cache.stats().await.load_errors, 2);
    }

    /// Test that an identifier containing the delimiter bypasses the cache.
    #[tokio::test]
    async fn test_invalid_identifier_bypasses_cache() {
        let (cache, _) = new_cache();
        let got = cache
            .get_or_load(Category::UserProfile, Some("a:b"), || async { Ok(Some(json!(1))) })
            .await;
        assert_eq!(got, Some(json!(1)));
        assert_eq!(cache.local_len(), 0);
    }

    /// Test the read-through helpers.
    #[tokio::test]
    async fn test_cached_helpers() {
        let (cache, _) = new_cache();
        let cache = Arc::new(cache);

        let got = cached(&cache, Category::ShopItems, None, || async { Ok(Some(json!(["scarf"]))) }).await;
        assert_eq!(got, Some(json!(["scarf"])));

        let loader: CachedLoader<Vec<u32>> = CachedLoader::new(cache.clone(), Category::Leaderboard);
        let first = loader.load(Some("week1"), || async { Ok(Some(vec![3, 2, 1])) }).await;
        let second = loader.load(Some("week1"), || async { Ok(Some(vec![0])) }).await;
        assert_eq!(first, Some(vec![3, 2, 1]));
        assert_eq!(second, Some(vec![3, 2, 1]));

        assert_eq!(loader.invalidate(Some("week1")).await, 2);
        let third = loader.load(Some("week1"), || async { Ok(Some(vec![0])) }).await;
        assert_eq!(third, Some(vec![0]));
    }

    /// Test that a typed loader that panics yields absence instead of
    /// unwinding into the caller.
    #[tokio::test]
    async fn test_typed_loader_panic_is_contained() {
        let (cache, _) = new_cache();
        let cache = Arc::new(cache);
        let loader: CachedLoader<Vec<u32>> = CachedLoader::new(cache.clone(), Category::Leaderboard);

        let got = loader
            .load(None, || async {
                if true {
                    panic!("ranking bug");
                }
                Ok(Some(vec![1]))
            })
            .await;
        assert_eq!(got, None);
        assert_eq!(cache.local_len(), 0);
        assert_eq!(cache.stats().await.load_errors, 1);

        let recovered = loader.load(None, || async { Ok(Some(vec![1])) }).await;
        assert_eq!(recovered, Some(vec![1]));
        assert_eq!(cache.stats().await.loads, 1);
    }

    /// Test that remote failure logs name the tier and the key.
    #[tokio::test]
    async fn test_remote_error_context() {
        let (cache, _) = new_cache();
        assert_eq!(cache.error_context("test:results"), "tier=memory key=test:results");

        let local_only = TieredCache::from_config(&config::new_test_config(), None);
        assert_eq!(local_only.error_context("k"), "tier=none key=k");
    }

    /// Test that clear empties both tiers under the prefix.
    #[tokio::test]
    async fn test_clear() {
        let (cache, remote) = new_cache();
        cache.set(Category::Schedule, json!(1), None).await;
        cache.set(Category::Results, json!(2), Some("x")).await;
        remote.set("foreign:key", &json!(0), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear().await, 4);
        assert_eq!(cache.local_len(), 0);
        assert_eq!(remote.raw_len(), 1);
    }
}
