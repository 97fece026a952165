//! Process-local TTL cache.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};

/// Entry count below which writes never sweep expired entries
const SWEEP_FLOOR: usize = 1024;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entries<V> {
    map: HashMap<String, Entry<V>>,
    /// Stored count at which the next write sweeps; at least twice the live
    /// count after the last sweep, so sweeping is amortised O(1) per write
    sweep_at: usize,
}

/// Typed in-memory cache with per-entry expiry.
///
/// Locks are held only for the map access itself, never across other I/O.
#[derive(Debug, Clone)]
pub struct LocalCache<V> {
    entries: Arc<RwLock<Entries<V>>>,
}

impl<V: Clone + Send + Sync> LocalCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries {
                map: HashMap::new(),
                sweep_at: SWEEP_FLOOR,
            })),
        }
    }

    /// Get a live entry
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .map
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace an entry that expires after `ttl`
    pub async fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries.map.len() >= entries.sweep_at {
            entries.map.retain(|_, entry| entry.expires_at > now);
            entries.sweep_at = (entries.map.len() * 2).max(SWEEP_FLOOR);
        }
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Replace an entry with `f(current)` under one write lock. A live entry
    /// keeps its expiry; a missing or expired one expires after `ttl`.
    pub async fn update(&self, key: &str, ttl: Duration, f: impl FnOnce(Option<&V>) -> V) -> V {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let live = entries.map.get(key).filter(|entry| entry.expires_at > now);
        let expires_at = live.map_or(now + ttl, |entry| entry.expires_at);
        let value = f(live.map(|entry| &entry.value));

        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        value
    }

    pub async fn remove(&self, key: &str) {
        self.entries.write().await.map.remove(key);
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .map
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries held, expired or not
    #[cfg(test)]
    async fn stored(&self) -> usize {
        self.entries.read().await.map.len()
    }
}

impl<V: Clone + Send + Sync> Default for LocalCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
