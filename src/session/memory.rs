//! In-process coordination store for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::store::{CoordinationStore, KeyTtl, StoreError};

#[derive(Debug)]
enum Value {
    Plain(String),
    Hash(HashMap<String, i64>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Coordination store held in a single mutex.
///
/// Each operation takes the lock once, so every primitive is atomic with
/// respect to the others, matching the single-round-trip semantics of Redis.
/// Expired keys are dropped lazily when touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries, now)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::InvalidValue {
        key: key.to_string(),
        message: "operation against a key holding the wrong kind of value".to_string(),
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Plain(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            true
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Plain(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
        });
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        Ok(self.with_entries(|entries, now| match entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        }))
    }

    async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Hash(fields) => {
                    let counter = fields.entry(field.to_string()).or_insert(0);
                    *counter += delta;
                    Ok(*counter)
                }
                Value::Plain(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, i64>, StoreError> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_nx_ex("k", "a", ttl).await.unwrap());
        assert!(!store.set_nx_ex("k", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(matches!(store.ttl("k").await.unwrap(), KeyTtl::Expires(_)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
        assert!(store
            .set_nx_ex("k", "again", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_hash_counters() {
        let store = MemoryStore::new();
        assert_eq!(store.hincr("h", "tab_switch", 1).await.unwrap(), 1);
        assert_eq!(store.hincr("h", "tab_switch", 1).await.unwrap(), 2);
        assert_eq!(store.hincr("h", "copy_paste", 1).await.unwrap(), 1);

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.get("tab_switch"), Some(&2));
        assert_eq!(all.get("copy_paste"), Some(&1));
        assert!(store.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hash_ops_on_plain_key_fail() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.hincr("k", "f", 1).await.is_err());
        assert!(store.hgetall("k").await.is_err());
    }
}
