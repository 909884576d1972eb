pub mod cached;
pub mod memory;
pub mod redis;
pub mod remote;
pub mod store;
pub mod sweeper;
pub mod ttl;

#[cfg(test)]
mod store_test;

pub use cached::{cached, CachedLoader};
pub use memory::MemoryTier;
pub use self::redis::RedisTier;
pub use remote::{RemoteError, RemoteTier};
pub use store::{CacheStats, TieredCache};
pub use sweeper::run_sweeper;
pub use ttl::TtlPolicy;
