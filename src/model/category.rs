// Package model provides the closed set of cacheable data kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category is a closed kind of cacheable data.
///
/// Names are snake_case and never contain the key delimiter, which is what
/// keeps `(category, identifier)` keys collision free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    LeagueTable,
    Schedule,
    MatchDetails,
    Results,
    TeamStats,
    PlayerStats,
    Leaderboard,
    UserProfile,
    UserBets,
    BetOdds,
    ShopItems,
    UserOrders,
    Achievements,
    AdminStats,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 14] = [
        Category::LeagueTable,
        Category::Schedule,
        Category::MatchDetails,
        Category::Results,
        Category::TeamStats,
        Category::PlayerStats,
        Category::Leaderboard,
        Category::UserProfile,
        Category::UserBets,
        Category::BetOdds,
        Category::ShopItems,
        Category::UserOrders,
        Category::Achievements,
        Category::AdminStats,
    ];

    /// Returns the stable wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::LeagueTable => "league_table",
            Category::Schedule => "schedule",
            Category::MatchDetails => "match_details",
            Category::Results => "results",
            Category::TeamStats => "team_stats",
            Category::PlayerStats => "player_stats",
            Category::Leaderboard => "leaderboard",
            Category::UserProfile => "user_profile",
            Category::UserBets => "user_bets",
            Category::BetOdds => "bet_odds",
            Category::ShopItems => "shop_items",
            Category::UserOrders => "user_orders",
            Category::Achievements => "achievements",
            Category::AdminStats => "admin_stats",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown cache category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
