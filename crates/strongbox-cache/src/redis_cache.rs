//! Redis-backed shared cache

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use serde::{Deserialize, Serialize};

use crate::SharedCache;
use crate::error::{CacheError, CacheResult};

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    pub url: String,
    pub pool_size: usize,
    /// Prepended to every key, e.g. `strongbox:`
    pub key_prefix: Option<String>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 4,
            key_prefix: None,
        }
    }
}

impl RedisCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if !(self.url.starts_with("redis://") || self.url.starts_with("rediss://")) {
            return Err(CacheError::InvalidConfig(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(CacheError::InvalidConfig(
                "Pool size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared cache on a Redis server
///
/// `add` maps to `SET key value NX PX ttl`, a single atomic command.
pub struct RedisCache {
    pool: Pool,
    key_prefix: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Create the pool and check the server answers PING
    pub async fn connect(config: &RedisCacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let mut pool_config = Config::from_url(&config.url);
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        let mut conn = pool.get().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("PING failed: {e}")))?;

        tracing::debug!(url = %config.url, "Redis cache connected");

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone().unwrap_or_default(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn unprefixed<'a>(&self, full: &'a str) -> &'a str {
        full.strip_prefix(self.key_prefix.as_str()).unwrap_or(full)
    }
}

/// Millisecond TTL for `PX`, which rejects zero
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn write(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<()>(&mut *conn).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value = redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<Option<String>>(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<i64>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        // Nil reply means the key already existed
        let reply = cmd.query_async::<Option<String>>(&mut *conn).await?;
        Ok(reply.is_some())
    }

    async fn clear(&self, keep: &[&str]) -> CacheResult<usize> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", self.key_prefix);

        let mut doomed = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<(u64, Vec<String>)>(&mut *conn)
                .await?;
            doomed.extend(
                keys.into_iter()
                    .filter(|full| !is_kept(self.unprefixed(full), keep)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        for chunk in doomed.chunks(SCAN_BATCH) {
            redis::cmd("DEL")
                .arg(chunk.to_vec())
                .query_async::<i64>(&mut *conn)
                .await?;
        }
        tracing::debug!(keys = doomed.len(), "Redis cache cleared");
        Ok(doomed.len())
    }
}

const SCAN_BATCH: usize = 500;

fn is_kept(key: &str, keep: &[&str]) -> bool {
    keep.iter().any(|prefix| key.starts_with(prefix))
}
