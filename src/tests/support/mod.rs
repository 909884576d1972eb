// Shared test support code for unit and scenario tests.

pub mod harness;
pub mod notifier;
pub mod remote;

pub use harness::{start_core, start_core_with, Harness};
pub use notifier::RecordingNotifier;
pub use remote::{FailingRemote, StallingRemote};
