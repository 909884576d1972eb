pub mod notifier;
pub mod subscriptions;

#[cfg(test)]
mod subscriptions_test;

pub use notifier::{BroadcastNotifier, Notifier, NotifyError, Push, SessionId, Target, UserId};
pub use subscriptions::{RegistryStats, SubscriptionRegistry};
