//! Deduplicated logging functionality to prevent log spam.

pub mod consts;
pub mod log_entry;
pub mod sanitizer;

pub use log_entry::{err, start_dedup_logger};
