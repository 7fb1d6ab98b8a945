//! Process-local cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::SharedCache;
use crate::error::CacheResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory cache with per-entry expiry
///
/// Clones share the same map. Suitable for a single process and for tests;
/// use the Redis cache when several processes must see the same lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn write(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn read(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn clear(&self, keep: &[&str]) -> CacheResult<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| keep.iter().any(|prefix| key.starts_with(prefix)));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let cache = InMemoryCache::new();

        cache.write("k", "v".to_string(), None).await.unwrap();
        assert_eq!(cache.read("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_only_when_absent() {
        let cache = InMemoryCache::new();

        assert!(cache.add("lock", "a".to_string(), None).await.unwrap());
        assert!(!cache.add("lock", "b".to_string(), None).await.unwrap());
        assert_eq!(cache.read("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_clear_keeps_listed_prefixes() {
        let cache = InMemoryCache::new();
        for key in ["restore.lock", "restore.status", "users.1", "settings"] {
            cache.write(key, "v".to_string(), None).await.unwrap();
        }

        assert_eq!(cache.clear(&["restore."]).await.unwrap(), 2);
        assert!(cache.read("restore.lock").await.unwrap().is_some());
        assert!(cache.read("restore.status").await.unwrap().is_some());
        assert_eq!(cache.read("users.1").await.unwrap(), None);
        assert_eq!(cache.read("settings").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryCache::new();
        let ttl = Some(Duration::from_secs(5));

        cache.write("k", "v".to_string(), ttl).await.unwrap();
        assert!(cache.add("lock", "a".to_string(), ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.read("k").await.unwrap(), None);
        assert!(cache.add("lock", "b".to_string(), ttl).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_has_one_winner() {
        let cache = InMemoryCache::new();

        let attempts = (0..16).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.add("lock", i.to_string(), None).await.unwrap() })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }
}
