// Package invalidation maps domain change events onto cache evictions.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::TieredCache;
use crate::config::{Config, ConfigTrait};
use crate::metrics;
use crate::model::Category;
use crate::notify::{Notifier, Target};

use super::defaults::default_rules;
use super::rule::{InvalidationRule, RuleView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvalidatorStats {
    pub applied: u64,
    pub unknown: u64,
    pub degraded: u64,
    pub notify_errors: u64,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    unknown: AtomicU64,
    degraded: AtomicU64,
    notify_errors: AtomicU64,
}

/// Rule engine between business mutations and the cache.
///
/// Never fails the caller: unknown change types, bad contexts and push
/// errors are logged and absorbed.
pub struct Invalidator {
    cache: Arc<TieredCache>,
    notifier: Option<Arc<dyn Notifier>>,
    rules: RwLock<HashMap<String, Arc<InvalidationRule>>>,
    counters: Counters,
}

impl Invalidator {
    /// Creates an engine with no rules.
    pub fn new(cache: Arc<TieredCache>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            cache,
            notifier,
            rules: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Creates an engine with the league defaults, then config rules on top.
    pub fn from_config(cfg: &Config, cache: Arc<TieredCache>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        let engine = Self::new(cache, notifier);
        for (change_type, rule) in default_rules() {
            engine.install(change_type, rule);
        }
        for (change_type, spec) in cfg.rules() {
            match InvalidationRule::try_from(&spec) {
                Ok(rule) => {
                    engine.install(&change_type, rule);
                }
                Err(e) => {
                    warn!(component = "invalidator", event = "bad_rule", change_type = %change_type, error = %e, "config rule skipped");
                }
            }
        }
        info!(component = "invalidator", event = "rules_loaded", rules = engine.rules.read().len(), "invalidation rules loaded");
        engine
    }

    /// Registers or replaces the rule of a change type.
    pub fn register_rule(&self, change_type: &str, rule: InvalidationRule) {
        let replaced = self.install(change_type, rule);
        info!(component = "invalidator", event = "register_rule", change_type, replaced, "rule registered");
    }

    fn install(&self, change_type: &str, rule: InvalidationRule) -> bool {
        self.rules
            .write()
            .insert(change_type.to_string(), Arc::new(rule))
            .is_some()
    }

    /// Categories the change type evicts. Empty when unregistered.
    pub fn affected_categories(&self, change_type: &str) -> BTreeSet<Category> {
        self.rules
            .read()
            .get(change_type)
            .map(|rule| rule.categories().clone())
            .unwrap_or_default()
    }

    /// Applies the rule of `change_type`.
    ///
    /// A template that renders evicts the scoped and the unscoped key of each
    /// category. Without a template, or when the context lacks a field, the
    /// whole category goes. Broadcast rules push `(change_type, context)` once.
    /// Returns false only for an unregistered change type.
    pub async fn invalidate_for_change(&self, change_type: &str, context: &Value) -> bool {
        let rule = self.rules.read().get(change_type).cloned();
        let Some(rule) = rule else {
            self.counters.unknown.fetch_add(1, Ordering::Relaxed);
            metrics::add_invalidation(false);
            warn!(component = "invalidator", event = "unknown_change", change_type, "no rule registered, nothing invalidated");
            return false;
        };

        let identifier = match rule.identifier() {
            None => None,
            Some(template) => match template.render(context) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        component = "invalidator",
                        event = "degraded",
                        change_type,
                        template = %template,
                        error = %e,
                        "identifier not rendered, invalidating whole categories"
                    );
                    None
                }
            },
        };

        let mut removed = 0;
        for category in rule.categories() {
            removed += match identifier.as_deref() {
                Some(id) => {
                    self.cache.invalidate(*category, Some(id)).await
                        + self.cache.invalidate(*category, None).await
                }
                None => self.cache.invalidate_category(*category).await,
            };
        }

        if rule.broadcast() {
            self.notify(change_type, context);
        }

        self.counters.applied.fetch_add(1, Ordering::Relaxed);
        metrics::add_invalidation(true);
        debug!(
            component = "invalidator",
            event = "applied",
            change_type,
            identifier = identifier.as_deref().unwrap_or(""),
            removed,
            "change invalidated"
        );
        true
    }

    fn notify(&self, change_type: &str, context: &Value) {
        let Some(notifier) = &self.notifier else {
            debug!(component = "invalidator", event = "no_notifier", change_type, "broadcast skipped");
            return;
        };
        if let Err(e) = notifier.emit(change_type, context, Target::Broadcast) {
            self.counters.notify_errors.fetch_add(1, Ordering::Relaxed);
            warn!(component = "invalidator", event = "notify_failed", change_type, error = %e, "change broadcast failed");
        }
    }

    /// Snapshot of every registered rule, sorted by change type.
    pub fn rules(&self) -> Vec<RuleView> {
        let mut views: Vec<RuleView> = self
            .rules
            .read()
            .iter()
            .map(|(change_type, rule)| RuleView::new(change_type, rule))
            .collect();
        views.sort_by(|a, b| a.change_type.cmp(&b.change_type));
        views
    }

    pub fn stats(&self) -> InvalidatorStats {
        InvalidatorStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            unknown: self.counters.unknown.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            notify_errors: self.counters.notify_errors.load(Ordering::Relaxed),
        }
    }
}
