//! In-process cache backend on moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use tokio::time::Instant;

use super::CacheBackend;
use crate::AuthError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Each entry expires after its own TTL, reset on every write
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Single-node cache backend.
///
/// Entries are not shared across replicas, so lockout counters and the
/// blacklist only hold per process. Use Redis for multi-node deployments.
#[derive(Clone)]
pub struct MemoryCache {
    cache: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self
            .cache
            .get(key)
            .await
            .filter(Entry::is_live)
            .map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        self.cache
            .insert(key.to_string(), Entry::new(value.to_string(), ttl))
            .await;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self
            .cache
            .remove(key)
            .await
            .filter(Entry::is_live)
            .map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        let entry = self
            .cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let current = existing
                    .map(|e| e.into_value())
                    .filter(Entry::is_live)
                    .and_then(|e| e.value.parse::<i64>().ok())
                    .unwrap_or(0);
                std::future::ready(Entry::new((current + 1).to_string(), ttl))
            })
            .await;

        entry
            .into_value()
            .value
            .parse()
            .map_err(|e| AuthError::Cache(format!("counter '{key}' is not an integer: {e}")))
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_take() {
        let cache = MemoryCache::default();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.take("k").await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_counts_from_one() {
        let cache = MemoryCache::default();
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.increment("c", ttl).await.unwrap(), 1);
        assert_eq!(cache.increment("c", ttl).await.unwrap(), 2);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("2"));
        cache.delete("c").await.unwrap();
        assert_eq!(cache.increment("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::default();
        cache.set("k", "v", Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_take_single_winner() {
        let cache = MemoryCache::default();
        cache.set("once", "token", Duration::from_secs(60)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.take("once").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
