//! Key-value coordination store interface.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a coordination store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// The store rejected or failed an operation.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be interpreted.
    #[error("Unexpected value at '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Expiry state of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (or has already expired).
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Maps a Redis `TTL` reply (-2 missing, -1 no expiry) to a `KeyTtl`.
    pub fn from_redis_reply(seconds: i64) -> Self {
        match seconds {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            0 => KeyTtl::Missing,
            s => KeyTtl::Expires(Duration::from_secs(s as u64)),
        }
    }

    /// Time left, if the key exists and expires in the future.
    pub fn remaining(self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(left) if !left.is_zero() => Some(left),
            _ => None,
        }
    }
}

/// The five primitives session control is built on.
///
/// Every method is a single atomic round trip at the store. Callers must not
/// compose them into read-modify-write sequences that need to be atomic.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Sets `key` only if it does not exist. Returns true if the value was set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Sets `key` unconditionally, replacing any expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Reads the expiry of `key`.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Atomically adds `delta` to a hash field and returns the new value.
    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// Reads every field of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, i64>, StoreError>;
}
