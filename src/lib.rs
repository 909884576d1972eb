#[path = "shared/dedlog/mod.rs"]
pub mod dedlog;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod cache;
pub mod config;
pub mod invalidation;
pub mod logs;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod tasks;

pub use app::{Core, CoreFactory};
