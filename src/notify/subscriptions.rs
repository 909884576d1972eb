// Package notify tracks which sessions care about which objects.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::metrics;

use super::notifier::{Notifier, SessionId, Target, UserId};

type Bucket = (String, Option<String>);

/// Registry sizes, for admin inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub users: usize,
    pub subscriptions: usize,
    pub buckets: usize,
}

#[derive(Default)]
struct Indices {
    session_user: HashMap<SessionId, UserId>,
    user_sessions: HashMap<UserId, HashSet<SessionId>>,
    // user -> type -> objects; None is the whole type
    forward: HashMap<UserId, HashMap<String, HashSet<Option<String>>>>,
    inverse: HashMap<Bucket, HashSet<UserId>>,
}

impl Indices {
    fn link(&mut self, user: UserId, kind: &str, object: Option<String>) {
        self.forward
            .entry(user)
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .insert(object.clone());
        self.inverse
            .entry((kind.to_string(), object))
            .or_default()
            .insert(user);
    }

    fn unlink_inverse(&mut self, user: UserId, bucket: Bucket) {
        if let Some(users) = self.inverse.get_mut(&bucket) {
            users.remove(&user);
            if users.is_empty() {
                self.inverse.remove(&bucket);
            }
        }
    }

    fn unlink(&mut self, user: UserId, kind: &str, object: Option<&str>) -> bool {
        let object = object.map(str::to_string);
        let Some(kinds) = self.forward.get_mut(&user) else {
            return false;
        };
        let Some(objects) = kinds.get_mut(kind) else {
            return false;
        };
        let removed = objects.remove(&object);
        if objects.is_empty() {
            kinds.remove(kind);
        }
        if kinds.is_empty() {
            self.forward.remove(&user);
        }
        if removed {
            self.unlink_inverse(user, (kind.to_string(), object));
        }
        removed
    }

    fn unlink_kind(&mut self, user: UserId, kind: &str) -> usize {
        let Some(kinds) = self.forward.get_mut(&user) else {
            return 0;
        };
        let objects = kinds.remove(kind).unwrap_or_default();
        if kinds.is_empty() {
            self.forward.remove(&user);
        }
        let n = objects.len();
        for object in objects {
            self.unlink_inverse(user, (kind.to_string(), object));
        }
        n
    }

    fn sweep_user(&mut self, user: UserId) -> usize {
        let kinds = self.forward.remove(&user).unwrap_or_default();
        let mut n = 0;
        for (kind, objects) in kinds {
            for object in objects {
                self.unlink_inverse(user, (kind.clone(), object));
                n += 1;
            }
        }
        n
    }

    fn detach_session(&mut self, session: &str) -> Option<(UserId, usize)> {
        let user = self.session_user.remove(session)?;
        let last = match self.user_sessions.get_mut(&user) {
            Some(sessions) => {
                sessions.remove(session);
                sessions.is_empty()
            }
            None => true,
        };
        if !last {
            return Some((user, 0));
        }
        self.user_sessions.remove(&user);
        Some((user, self.sweep_user(user)))
    }

    fn sessions_of(&self, users: &HashSet<UserId>) -> Vec<SessionId> {
        let mut out: Vec<SessionId> = users
            .iter()
            .filter_map(|u| self.user_sessions.get(u))
            .flat_map(|s| s.iter().cloned())
            .collect();
        out.sort();
        out
    }
}

/// Selective subscription registry in front of a [`Notifier`].
///
/// Keeps `session -> user`, a forward index `user -> type -> objects` and the
/// inverse `(type, object) -> users`. Both indices change under one lock so
/// they never disagree.
pub struct SubscriptionRegistry {
    notifier: Arc<dyn Notifier>,
    broadcast_fallback: bool,
    inner: Mutex<Indices>,
}

impl SubscriptionRegistry {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            broadcast_fallback: true,
            inner: Mutex::new(Indices::default()),
        }
    }

    pub fn from_config(cfg: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(notifier).with_broadcast_fallback(cfg.broadcast_fallback())
    }

    /// Whether a targeted publish with no interested users broadcasts instead.
    pub fn with_broadcast_fallback(mut self, enabled: bool) -> Self {
        self.broadcast_fallback = enabled;
        self
    }

    pub fn broadcast_fallback(&self) -> bool {
        self.broadcast_fallback
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Binds a session to a user. Rebinding a session to another user first
    /// detaches it from the previous one.
    pub fn on_connect(&self, session: &str, user: UserId) {
        let mut inner = self.inner.lock();
        if inner.session_user.get(session).is_some_and(|u| *u != user) {
            inner.detach_session(session);
        }
        inner.session_user.insert(session.to_string(), user);
        inner
            .user_sessions
            .entry(user)
            .or_default()
            .insert(session.to_string());
        metrics::set_sessions(inner.session_user.len());
        debug!(component = "subscriptions", event = "connect", session, user, "session connected");
    }

    /// Drops a session. The user's subscriptions are swept when it was their
    /// last live session. Returns false for an unknown session.
    pub fn on_disconnect(&self, session: &str) -> bool {
        let mut inner = self.inner.lock();
        let detached = inner.detach_session(session);
        metrics::set_sessions(inner.session_user.len());
        match detached {
            Some((user, swept)) => {
                debug!(component = "subscriptions", event = "disconnect", session, user, swept, "session disconnected");
                true
            }
            None => false,
        }
    }

    /// Registers interest of the session's user. `object` None (or empty)
    /// means the whole type.
    pub fn subscribe(&self, session: &str, kind: &str, object: Option<&str>) -> bool {
        let object = normalize(object);
        let mut inner = self.inner.lock();
        let Some(user) = inner.session_user.get(session).copied() else {
            warn!(component = "subscriptions", event = "subscribe", session, kind, "unknown session");
            return false;
        };
        inner.link(user, kind, object.map(str::to_string));
        true
    }

    /// Removes interest. `object` None tears down every subscription of that
    /// type for the user. Returns whether anything was removed.
    pub fn unsubscribe(&self, session: &str, kind: &str, object: Option<&str>) -> bool {
        let object = normalize(object);
        let mut inner = self.inner.lock();
        let Some(user) = inner.session_user.get(session).copied() else {
            return false;
        };
        match object {
            Some(object) => inner.unlink(user, kind, Some(object)),
            None => inner.unlink_kind(user, kind) > 0,
        }
    }

    /// Publishes an update.
    ///
    /// With an object, delivers to live sessions of users subscribed to that
    /// object or to the whole type. Without one, broadcasts. Returns whether
    /// at least one push was handed to the notifier.
    pub fn publish(&self, kind: &str, payload: &Value, object: Option<&str>) -> bool {
        let Some(object) = normalize(object) else {
            return self.broadcast(kind, payload);
        };

        let sessions = {
            let inner = self.inner.lock();
            let mut users = HashSet::new();
            for bucket in [(kind.to_string(), Some(object.to_string())), (kind.to_string(), None)] {
                if let Some(found) = inner.inverse.get(&bucket) {
                    users.extend(found.iter().copied());
                }
            }
            inner.sessions_of(&users)
        };

        if sessions.is_empty() {
            if self.broadcast_fallback {
                debug!(component = "subscriptions", event = "fallback", kind, object, "no subscribers, broadcasting");
                return self.broadcast(kind, payload);
            }
            debug!(component = "subscriptions", event = "dropped", kind, object, "no subscribers");
            return false;
        }

        let (mut sent, mut errors) = (0u64, 0u64);
        for session in sessions {
            match self.notifier.emit(kind, payload, Target::Session(session.clone())) {
                Ok(()) => sent += 1,
                Err(e) => {
                    errors += 1;
                    warn!(component = "subscriptions", event = "push_failed", kind, session = %session, error = %e, "targeted push failed");
                }
            }
        }
        metrics::add_pushes(sent, 0, errors);
        sent > 0
    }

    fn broadcast(&self, kind: &str, payload: &Value) -> bool {
        match self.notifier.emit(kind, payload, Target::Broadcast) {
            Ok(()) => {
                metrics::add_pushes(0, 1, 0);
                true
            }
            Err(e) => {
                metrics::add_pushes(0, 0, 1);
                warn!(component = "subscriptions", event = "push_failed", kind, error = %e, "broadcast failed");
                false
            }
        }
    }

    /// Subscriptions of the session's user, sorted.
    pub fn subscriptions_of(&self, session: &str) -> Vec<(String, Option<String>)> {
        let inner = self.inner.lock();
        let Some(user) = inner.session_user.get(session) else {
            return Vec::new();
        };
        let set: BTreeSet<(String, Option<String>)> = inner
            .forward
            .get(user)
            .into_iter()
            .flat_map(|kinds| {
                kinds
                    .iter()
                    .flat_map(|(kind, objects)| objects.iter().map(move |o| (kind.clone(), o.clone())))
            })
            .collect();
        set.into_iter().collect()
    }

    /// Users currently in the inverse bucket of `(kind, object)`.
    pub fn interested_users(&self, kind: &str, object: Option<&str>) -> Vec<UserId> {
        let inner = self.inner.lock();
        let bucket = (kind.to_string(), normalize(object).map(str::to_string));
        let mut users: Vec<UserId> = inner
            .inverse
            .get(&bucket)
            .map(|u| u.iter().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            sessions: inner.session_user.len(),
            users: inner.user_sessions.len(),
            subscriptions: inner
                .forward
                .values()
                .flat_map(|kinds| kinds.values())
                .map(HashSet::len)
                .sum(),
            buckets: inner.inverse.len(),
        }
    }

    /// Logs current registry sizes.
    pub fn log_stats(&self) {
        let s = self.stats();
        info!(
            component = "subscriptions",
            sessions = s.sessions,
            users = s.users,
            subscriptions = s.subscriptions,
            buckets = s.buckets,
            "subscription registry stats"
        );
    }

    /// Whether forward and inverse indices describe the same pairs.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let inner = self.inner.lock();
        let forward: HashSet<(UserId, Bucket)> = inner
            .forward
            .iter()
            .flat_map(|(user, kinds)| {
                kinds.iter().flat_map(move |(kind, objects)| {
                    objects.iter().map(move |o| (*user, (kind.clone(), o.clone())))
                })
            })
            .collect();
        let inverse: HashSet<(UserId, Bucket)> = inner
            .inverse
            .iter()
            .flat_map(|(bucket, users)| users.iter().map(move |u| (*u, bucket.clone())))
            .collect();
        forward == inverse && inner.inverse.values().all(|u| !u.is_empty())
    }
}

fn normalize(object: Option<&str>) -> Option<&str> {
    object.filter(|o| !o.is_empty())
}
