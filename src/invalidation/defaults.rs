// Package invalidation ships the league's built-in change rules.

use crate::model::Category;

use super::rule::InvalidationRule;

pub const SCORE_UPDATE: &str = "score_update";
pub const MATCH_SCHEDULED: &str = "match_scheduled";
pub const PLAYER_STATS_UPDATE: &str = "player_stats_update";
pub const BET_PLACED: &str = "bet_placed";
pub const ODDS_UPDATE: &str = "odds_update";
pub const BETS_SETTLED: &str = "bets_settled";
pub const USER_UPDATE: &str = "user_update";
pub const SHOP_UPDATE: &str = "shop_update";
pub const ORDER_UPDATE: &str = "order_update";
pub const ACHIEVEMENT_UNLOCKED: &str = "achievement_unlocked";
pub const ADMIN_ACTION: &str = "admin_action";
pub const SEASON_RESET: &str = "season_reset";

/// Built-in rules. Config rules with the same change type replace these.
pub fn default_rules() -> Vec<(&'static str, InvalidationRule)> {
    let scoped = |categories: &[Category], template: &'static str, broadcast: bool| {
        // templates below are literals and always parse
        InvalidationRule::new(categories.iter().copied())
            .with_identifier(template)
            .unwrap_or_else(|_| InvalidationRule::new(categories.iter().copied()))
            .with_broadcast(broadcast)
    };
    let whole = |categories: &[Category], broadcast: bool| {
        InvalidationRule::new(categories.iter().copied()).with_broadcast(broadcast)
    };

    vec![
        (
            SCORE_UPDATE,
            scoped(
                &[
                    Category::MatchDetails,
                    Category::Results,
                    Category::LeagueTable,
                    Category::TeamStats,
                ],
                "{home}_{away}",
                true,
            ),
        ),
        (MATCH_SCHEDULED, whole(&[Category::Schedule], true)),
        (PLAYER_STATS_UPDATE, scoped(&[Category::PlayerStats], "{player_id}", false)),
        (BET_PLACED, scoped(&[Category::UserBets], "{user_id}", false)),
        (ODDS_UPDATE, scoped(&[Category::BetOdds], "{match_id}", true)),
        (BETS_SETTLED, whole(&[Category::UserBets, Category::Leaderboard], true)),
        (USER_UPDATE, scoped(&[Category::UserProfile], "{user_id}", false)),
        (SHOP_UPDATE, whole(&[Category::ShopItems], true)),
        (ORDER_UPDATE, scoped(&[Category::UserOrders], "{user_id}", false)),
        (
            ACHIEVEMENT_UNLOCKED,
            scoped(&[Category::Achievements, Category::UserProfile], "{user_id}", false),
        ),
        (ADMIN_ACTION, whole(&[Category::AdminStats], false)),
        (
            SEASON_RESET,
            whole(
                &[
                    Category::LeagueTable,
                    Category::Schedule,
                    Category::MatchDetails,
                    Category::Results,
                    Category::TeamStats,
                    Category::PlayerStats,
                    Category::Leaderboard,
                ],
                true,
            ),
        ),
    ]
}
