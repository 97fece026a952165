//! Cache tiers used in front of the durable identity store.
//!
//! - [`LocalCache`]: typed, in-process, per-instance (secrets only)
//! - [`DistributedCache`]: string-keyed JSON values shared by every instance
//!   (secrets, user views, confirmation codes). [`RedisCache`] in production,
//!   [`MemoryCache`] for tests and single-process deployments.
//!
//! Caches are advisory: every caller tolerates a miss, and a failing shared
//! tier only makes lookups slower.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;

pub mod local;
pub mod memory;
pub mod redis;

pub use local::LocalCache;
pub use memory::MemoryCache;
pub use redis::RedisCache;

/// Shared cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis transport or protocol error
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Cached value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Get/set-with-TTL contract of the shared cache tier.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Fetch a raw value
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a raw value for `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Drop a value if present
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically add one to a counter and return the new count. A missing
    /// counter starts at zero and expires after `ttl`; later increments keep
    /// that expiry.
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<u64>;
}

/// Fetch and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn DistributedCache,
    key: &str,
) -> CacheResult<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value.
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn DistributedCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> CacheResult<()> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl).await
}
