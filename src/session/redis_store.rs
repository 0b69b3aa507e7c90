//! Redis-backed coordination store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::store::{CoordinationStore, KeyTtl, StoreError};

/// Coordination store on a shared Redis connection.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// operation clones it rather than holding a lock.
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }

    /// Wraps an existing connection manager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

fn whole_seconds(ttl: Duration) -> u64 {
    // Redis rejects EX 0.
    ttl.as_secs().max(1)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        // SET NX replies OK on success and nil when the key exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(whole_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(whole_seconds(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.redis.clone();
        let seconds: i64 = conn.ttl(key).await?;
        Ok(KeyTtl::from_redis_reply(seconds))
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.redis.clone();
        let value: i64 = conn.hincr(key, field, delta).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut conn = self.redis.clone();
        let raw: HashMap<String, String> = conn.hgetall(key).await?;

        raw.into_iter()
            .map(|(field, value)| {
                value
                    .parse::<i64>()
                    .map(|n| (field.clone(), n))
                    .map_err(|e| StoreError::InvalidValue {
                        key: format!("{}#{}", key, field),
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
