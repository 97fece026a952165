//! Redis-backed shared cache.

use super::{CacheResult, DistributedCache};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::time::Duration;

/// Shared cache over a multiplexed Redis connection.
///
/// Cloning the connection is cheap; every call uses its own clone so no lock
/// is held across network round trips.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    /// Connect to Redis
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g. `redis://127.0.0.1/`)
    /// * `prefix` - Namespace prepended to every key
    pub async fn connect(url: &str, prefix: &str) -> CacheResult<Self> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut connection = self.connection.clone();
        // Redis rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = connection.set_ex(self.key(key), value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(self.key(key)).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let mut connection = self.connection.clone();
        let key = self.key(key);
        // SET NX starts the window only for a new counter; INCR keeps the TTL
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .arg("NX")
            .ignore()
            .incr(&key, 1)
            .query_async(&mut connection)
            .await?;
        Ok(count)
    }
}
