// Notifier double that records every push.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::notify::{Notifier, NotifyError, Push, Target};

/// Records pushes instead of sending them. Can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pushes: Mutex<Vec<Push>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.pushes.lock().len()
    }

    /// Sessions that received a targeted push, in emit order.
    pub fn sessions(&self) -> Vec<String> {
        self.pushes
            .lock()
            .iter()
            .filter_map(|p| match &p.target {
                Target::Session(id) => Some(id.clone()),
                Target::Broadcast => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> usize {
        self.pushes
            .lock()
            .iter()
            .filter(|p| p.target == Target::Broadcast)
            .count()
    }

    pub fn clear(&self) {
        self.pushes.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, event: &str, payload: &Value, target: Target) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(NotifyError::Transport("recording notifier set to fail".into()));
        }
        self.pushes.lock().push(Push {
            event: event.to_string(),
            payload: payload.clone(),
            target,
        });
        Ok(())
    }
}
