#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;

    use crate::notify::{Notifier, SubscriptionRegistry, Target};
    use crate::support::RecordingNotifier;

    fn registry() -> (SubscriptionRegistry, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let registry = SubscriptionRegistry::new(notifier.clone() as Arc<dyn Notifier>);
        (registry, notifier)
    }

    /// Test that an object publish reaches only interested sessions.
    #[test]
    fn test_targeted_publish() {
        let (reg, notifier) = registry();
        reg.on_connect("s1", 1);
        reg.on_connect("s2", 2);
        reg.on_connect("s3", 3);
        assert!(reg.subscribe("s1", "match_score", Some("M1")));
        assert!(reg.subscribe("s2", "match_score", Some("M2")));
        // whole-type subscriber
        assert!(reg.subscribe("s3", "match_score", None));

        assert!(reg.publish("match_score", &json!({"score": "1:0"}), Some("M1")));
        assert_eq!(notifier.sessions(), vec!["s1".to_string(), "s3".to_string()]);
        assert_eq!(notifier.broadcasts(), 0);
        assert!(reg.is_consistent());
    }

    /// Test that every live session of an interested user is reached.
    #[test]
    fn test_publish_reaches_all_user_sessions() {
        let (reg, notifier) = registry();
        reg.on_connect("phone", 7);
        reg.on_connect("desktop", 7);
        reg.subscribe("phone", "bets", Some("B1"));

        assert!(reg.publish("bets", &json!(1), Some("B1")));
        assert_eq!(notifier.sessions(), vec!["desktop".to_string(), "phone".to_string()]);
    }

    /// Test the fallback broadcast and the flag that disables it.
    #[test]
    fn test_fallback_broadcast() {
        let (reg, notifier) = registry();
        reg.on_connect("s1", 1);
        assert!(reg.publish("match_score", &json!(1), Some("M9")));
        assert_eq!(notifier.broadcasts(), 1);

        let notifier = Arc::new(RecordingNotifier::new());
        let strict = SubscriptionRegistry::new(notifier.clone() as Arc<dyn Notifier>)
            .with_broadcast_fallback(false);
        strict.on_connect("s1", 1);
        assert!(!strict.publish("match_score", &json!(1), Some("M9")));
        assert_eq!(notifier.count(), 0);
    }

    /// Test that publishing without an object always broadcasts.
    #[test]
    fn test_publish_without_object_broadcasts() {
        let (reg, notifier) = registry();
        reg.on_connect("s1", 1);
        reg.subscribe("s1", "league_table", None);

        assert!(reg.publish("league_table", &json!([1, 2]), None));
        assert!(reg.publish("league_table", &json!([1, 2]), Some("")));
        assert_eq!(notifier.broadcasts(), 2);
        assert_eq!(notifier.pushes()[0].target, Target::Broadcast);
    }

    /// Test that disconnecting sweeps the inverse index so the user receives
    /// nothing afterwards.
    #[test]
    fn test_disconnect_sweeps_indices() {
        let (reg, notifier) = registry();
        reg.on_connect("sessionA", 1);
        reg.subscribe("sessionA", "match_score", Some("M1"));
        reg.subscribe("sessionA", "bets", None);
        assert_eq!(reg.interested_users("match_score", Some("M1")), vec![1]);

        assert!(reg.on_disconnect("sessionA"));
        assert!(reg.interested_users("match_score", Some("M1")).is_empty());
        assert_eq!(reg.stats().buckets, 0);
        assert_eq!(reg.stats().subscriptions, 0);
        assert!(reg.is_consistent());

        reg.on_connect("sessionB", 2);
        reg.subscribe("sessionB", "match_score", Some("M1"));
        reg.publish("match_score", &json!(1), Some("M1"));
        assert_eq!(notifier.sessions(), vec!["sessionB".to_string()]);
        assert_eq!(reg.interested_users("match_score", Some("M1")), vec![2]);
    }

    /// Test that subscriptions survive while the user has another session.
    #[test]
    fn test_disconnect_keeps_other_sessions() {
        let (reg, _) = registry();
        reg.on_connect("s1", 1);
        reg.on_connect("s2", 1);
        reg.subscribe("s1", "match_score", Some("M1"));

        assert!(reg.on_disconnect("s1"));
        assert_eq!(reg.interested_users("match_score", Some("M1")), vec![1]);
        assert_eq!(reg.subscriptions_of("s2").len(), 1);

        assert!(reg.on_disconnect("s2"));
        assert!(!reg.on_disconnect("s2"));
        assert_eq!(reg.stats().users, 0);
    }

    /// Test unsubscribing one object and a whole type.
    #[test]
    fn test_unsubscribe() {
        let (reg, _) = registry();
        reg.on_connect("s1", 1);
        reg.subscribe("s1", "match_score", Some("M1"));
        reg.subscribe("s1", "match_score", Some("M2"));
        reg.subscribe("s1", "match_score", None);
        reg.subscribe("s1", "bets", Some("B1"));

        assert!(reg.unsubscribe("s1", "match_score", Some("M1")));
        assert!(!reg.unsubscribe("s1", "match_score", Some("M1")));
        assert_eq!(reg.subscriptions_of("s1").len(), 3);

        assert!(reg.unsubscribe("s1", "match_score", None));
        assert_eq!(
            reg.subscriptions_of("s1"),
            vec![("bets".to_string(), Some("B1".to_string()))]
        );
        assert!(reg.interested_users("match_score", Some("M2")).is_empty());
        assert!(reg.is_consistent());
    }

    /// Test that unknown sessions cannot subscribe.
    #[test]
    fn test_unknown_session() {
        let (reg, _) = registry();
        assert!(!reg.subscribe("ghost", "match_score", Some("M1")));
        assert!(!reg.unsubscribe("ghost", "match_score", None));
        assert!(reg.subscriptions_of("ghost").is_empty());
    }

    /// Test that rebinding a session to another user detaches the old one.
    #[test]
    fn test_reconnect_as_other_user() {
        let (reg, _) = registry();
        reg.on_connect("s1", 1);
        reg.subscribe("s1", "match_score", Some("M1"));
        reg.on_connect("s1", 2);

        assert!(reg.interested_users("match_score", Some("M1")).is_empty());
        assert_eq!(reg.stats().users, 1);
        assert!(reg.is_consistent());
    }

    /// Test that push errors turn into a false publish.
    #[test]
    fn test_failing_notifier() {
        let (reg, notifier) = registry();
        reg.on_connect("s1", 1);
        reg.subscribe("s1", "match_score", Some("M1"));
        notifier.set_failing(true);

        assert!(!reg.publish("match_score", &json!(1), Some("M1")));
        assert!(!reg.publish("match_score", &json!(1), None));
    }
}
