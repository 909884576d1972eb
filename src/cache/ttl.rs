// Package cache resolves per-category tier ttls.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{Config, ConfigTrait, TierTtl};
use crate::model::Category;

/// Per-category ttl table with a fallback for unlisted categories.
#[derive(Debug, Clone, Default)]
pub struct TtlPolicy {
    default: TierTtl,
    table: HashMap<Category, TierTtl>,
}

impl TtlPolicy {
    pub fn new(default: TierTtl) -> Self {
        Self {
            default,
            table: HashMap::new(),
        }
    }

    /// Resolves every category once from configuration.
    pub fn from_config(cfg: &Config) -> Self {
        let table = Category::ALL.iter().map(|c| (*c, cfg.ttl(*c))).collect();
        Self {
            default: TierTtl::default(),
            table,
        }
    }

    /// Overrides one category.
    pub fn with(mut self, category: Category, ttl: TierTtl) -> Self {
        self.table.insert(category, ttl);
        self
    }

    pub fn for_category(&self, category: Category) -> TierTtl {
        self.table.get(&category).copied().unwrap_or(self.default)
    }

    pub fn local(&self, category: Category) -> Duration {
        self.for_category(category).local
    }

    pub fn remote(&self, category: Category) -> Duration {
        self.for_category(category).remote
    }
}
