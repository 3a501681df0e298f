//! Per-user role cache
//!
//! The engine only relies on the get/put contract of [`RoleCache`]; eviction
//! and invalidation belong to the implementation and to whoever edits roles.
//! A stale entry is served as-is.

use crate::config::CacheConfig;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Key-value store of resolved tokens keyed by user id
///
/// Implementations must tolerate concurrent access for the same user id;
/// last write wins.
#[async_trait]
pub trait RoleCache: Send + Sync {
    /// Previously stored tokens for `user_id`
    async fn get(&self, user_id: &str) -> Result<Option<Vec<String>>>;

    /// Replace the stored tokens for `user_id`
    async fn put(&self, user_id: &str, roles: Vec<String>) -> Result<()>;

    /// Forget `user_id`
    async fn del(&self, user_id: &str) -> Result<()>;
}

/// Cached entry with TTL
#[derive(Debug, Clone)]
struct CachedRoles {
    roles: Vec<String>,
    cached_at: Instant,
}

impl CachedRoles {
    fn new(roles: Vec<String>) -> Self {
        Self {
            roles,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded in-process role cache (LRU eviction, TTL expiry)
pub struct InMemoryRoleCache {
    entries: Mutex<LruCache<String, CachedRoles>>,
    ttl: Duration,
    stats: Arc<DashMap<&'static str, usize>>,
}

impl InMemoryRoleCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl(),
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of hit/miss counters
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await.len();
        CacheStats {
            hits: self.stat("hits"),
            misses: self.stat("misses"),
            expirations: self.stat("expirations"),
            entries,
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.stats.clear();
    }

    fn increment_stat(&self, key: &'static str) {
        *self.stats.entry(key).or_insert(0) += 1;
    }

    fn stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

impl Default for InMemoryRoleCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl RoleCache for InMemoryRoleCache {
    async fn get(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.get(user_id) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                self.increment_stat("hits");
                return Ok(Some(entry.roles.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(user_id);
            self.increment_stat("expirations");
        }
        self.increment_stat("misses");
        Ok(None)
    }

    async fn put(&self, user_id: &str, roles: Vec<String>) -> Result<()> {
        self.entries
            .lock()
            .await
            .put(user_id.to_string(), CachedRoles::new(roles));
        Ok(())
    }

    async fn del(&self, user_id: &str) -> Result<()> {
        self.entries.lock().await.pop(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize, ttl_secs: u64) -> CacheConfig {
        CacheConfig {
            capacity,
            ttl_secs,
        }
    }

    #[tokio::test]
    async fn test_put_get_del() {
        let cache = InMemoryRoleCache::default();

        assert_eq!(cache.get("u1").await.unwrap(), None);
        cache.put("u1", vec!["role:a".to_string()]).await.unwrap();
        assert_eq!(
            cache.get("u1").await.unwrap(),
            Some(vec!["role:a".to_string()])
        );

        cache.del("u1").await.unwrap();
        assert_eq!(cache.get("u1").await.unwrap(), None);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = InMemoryRoleCache::default();
        cache.put("u1", vec!["role:a".to_string()]).await.unwrap();
        cache.put("u1", vec!["role:b".to_string()]).await.unwrap();
        assert_eq!(
            cache.get("u1").await.unwrap(),
            Some(vec!["role:b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = InMemoryRoleCache::new(&config(2, 300));
        cache.put("u1", vec![]).await.unwrap();
        cache.put("u2", vec![]).await.unwrap();
        cache.put("u3", vec![]).await.unwrap();

        assert_eq!(cache.get("u1").await.unwrap(), None);
        assert!(cache.get("u3").await.unwrap().is_some());
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires() {
        let cache = InMemoryRoleCache::new(&config(10, 0));
        cache.put("u1", vec!["role:a".to_string()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.get("u1").await.unwrap(), None);
        assert_eq!(cache.stats().await.expirations, 1);
    }
}
