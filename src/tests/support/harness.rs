// Scenario test harness: a fully wired core over the test config.

use std::sync::Arc;
use std::time::Duration;

use crate::app::Core;
use crate::config::{self, Config};
use crate::notify::Notifier;

use super::notifier::RecordingNotifier;

/// Core plus the notifier double it pushes into.
pub struct Harness {
    pub core: Arc<Core>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn shutdown(&self) -> bool {
        self.core.shutdown(Duration::from_secs(1)).await
    }
}

/// Starts a core on `new_test_config()` with a recording notifier.
pub async fn start_core() -> Harness {
    start_core_with(config::new_test_config()).await
}

pub async fn start_core_with(cfg: Config) -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let core = Core::new(cfg, notifier.clone() as Arc<dyn Notifier>).await;
    Harness { core, notifier }
}
