//! # Strongbox Cache
//!
//! A minimal shared key/value store. The one hard requirement is
//! [`SharedCache::add`]: create-if-absent as a single atomic operation, which
//! the restore lock is built on.

pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis_cache::{RedisCache, RedisCacheConfig};

/// Key/value store shared by every process that may run a restore
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Set `key`, replacing any existing value
    async fn write(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Current value, or `None` if absent or expired
    async fn read(&self, key: &str) -> CacheResult<Option<String>>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Set `key` only if it holds no live value. Returns whether it was set.
    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Delete every key that does not start with one of `keep`.
    ///
    /// Returns the number of keys removed.
    async fn clear(&self, keep: &[&str]) -> CacheResult<usize>;
}
