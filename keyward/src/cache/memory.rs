//! In-process implementation of the shared cache contract.
//!
//! Suitable for tests and single-instance deployments. Separate processes do
//! NOT see each other's entries.

use super::{CacheResult, DistributedCache, LocalCache};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: LocalCache<String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.entries.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.is_empty().await
    }
}

#[async_trait]
impl DistributedCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.set(key, value.to_string(), ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key).await;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let count = self
            .entries
            .update(key, ttl, |current| {
                let count = current.and_then(|raw| raw.parse::<u64>().ok()).unwrap_or(0);
                (count + 1).to_string()
            })
            .await;
        Ok(count.parse().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_contract() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_incr_counts_within_window() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(30);
        assert_eq!(cache.incr("n", ttl).await.unwrap(), 1);
        assert_eq!(cache.incr("n", ttl).await.unwrap(), 2);
        assert_eq!(cache.get("n").await.unwrap().as_deref(), Some("2"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.incr("n", ttl).await.unwrap(), 1);
    }
}
