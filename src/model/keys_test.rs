#[cfg(test)]
mod tests {
    use crate::model::{belongs_to, CacheKey, Category, InvalidIdentifier};

    /// Test that the unscoped and scoped forms render differently.
    #[test]
    fn test_render_scoped_and_unscoped() {
        let unscoped = CacheKey::new(Category::MatchDetails, None).unwrap();
        let scoped = CacheKey::new(Category::MatchDetails, Some("A_B")).unwrap();

        assert_eq!(unscoped.render(), "match_details");
        assert_eq!(scoped.render(), "match_details:A_B");
        assert_ne!(unscoped, scoped);
    }

    /// Test that an empty identifier is the unscoped entry.
    #[test]
    fn test_empty_identifier_is_unscoped() {
        let key = CacheKey::new(Category::LeagueTable, Some("")).unwrap();
        assert!(!key.is_scoped());
        assert_eq!(key, CacheKey::unscoped(Category::LeagueTable));
    }

    /// Test that the delimiter is rejected inside identifiers.
    #[test]
    fn test_delimiter_in_identifier_rejected() {
        let err = CacheKey::new(Category::UserProfile, Some("a:b")).unwrap_err();
        assert_eq!(err, InvalidIdentifier("a:b".to_string()));
    }

    /// Test that distinct pairs never render to the same key.
    #[test]
    fn test_distinct_pairs_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        for category in Category::ALL {
            for id in [None, Some("1"), Some("user_bets"), Some("league_table_1")] {
                let key = CacheKey::new(category, id).unwrap().render();
                assert!(seen.insert(key.clone()), "collision on {key}");
            }
        }
    }

    /// Test that rendered keys parse back to the same pair.
    #[test]
    fn test_parse_rendered_key() {
        let key = CacheKey::new(Category::UserBets, Some("42")).unwrap();
        assert_eq!(CacheKey::parse(&key.render()), Some(key));
        assert_eq!(
            CacheKey::parse("results"),
            Some(CacheKey::unscoped(Category::Results))
        );
        assert_eq!(CacheKey::parse("unknown:1"), None);
        assert_eq!(CacheKey::parse("results:"), None);
    }

    /// Test category membership does not match on bare name prefixes.
    #[test]
    fn test_belongs_to_requires_delimiter() {
        assert!(belongs_to("results", Category::Results));
        assert!(belongs_to("results:A_B", Category::Results));
        assert!(!belongs_to("results_archive", Category::Results));
        assert!(!belongs_to("match_details:A_B", Category::Results));
    }

    /// Test category names parse case-insensitively.
    #[test]
    fn test_category_from_str() {
        assert_eq!("League_Table".parse::<Category>().unwrap(), Category::LeagueTable);
        assert!("nope".parse::<Category>().is_err());
    }
}
