//! Cache data model: categories, keys and local entries.

pub mod category;
pub mod entry;
pub mod keys;

#[cfg(test)]
mod keys_test;

// Re-export main types
pub use category::{Category, UnknownCategory};
pub use entry::Entry;
pub use keys::{belongs_to, scoped_prefix, CacheKey, InvalidIdentifier, DELIMITER};
