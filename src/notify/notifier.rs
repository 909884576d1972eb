// Package notify defines the outbound push channel.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

pub type SessionId = String;
pub type UserId = i64;

/// Where a push goes: every connected session or exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "session", rename_all = "snake_case")]
pub enum Target {
    Broadcast,
    Session(SessionId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Broadcast => f.write_str("broadcast"),
            Target::Session(id) => write!(f, "session:{}", id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no transport is listening")]
    NoListeners,
    #[error("transport failed: {0}")]
    Transport(String),
}

/// Push transport implemented by the hosting app (a websocket layer, say).
///
/// Calls must not block; transports queue internally.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: &str, payload: &Value, target: Target) -> Result<(), NotifyError>;
}

/// One push as seen by a transport subscribed to [`BroadcastNotifier`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Push {
    pub event: String,
    pub payload: Value,
    pub target: Target,
}

/// Fans pushes out over a tokio broadcast channel.
///
/// Each transport holds a receiver and routes `Target::Session` pushes to the
/// matching socket itself. Slow receivers lose the oldest pushes.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Push>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.tx.subscribe()
    }

    pub fn receivers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, event: &str, payload: &Value, target: Target) -> Result<(), NotifyError> {
        let push = Push {
            event: event.to_string(),
            payload: payload.clone(),
            target,
        };
        match self.tx.send(push) {
            Ok(n) => {
                debug!(component = "notifier", event = "emit", name = event, receivers = n, "push sent");
                Ok(())
            }
            Err(_) => Err(NotifyError::NoListeners),
        }
    }
}
