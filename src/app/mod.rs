#[allow(clippy::module_inception)]
pub mod app;

pub use app::{Core, CoreFactory, CoreStats};
