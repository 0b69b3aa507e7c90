//! Exam session primitives: lock, timer, heartbeat and violation counters.
//!
//! The store is the only authority for all of these. Nothing here caches a
//! value between calls; remaining time in particular is re-read from the
//! timer key's TTL every time it is asked for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{CoordinationStore, StoreError};
use crate::error::{PipelineError, PipelineResult};

/// Default lifetime of a session lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Default lifetime of a heartbeat marker.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(60);

/// Store keys for one attempt.
pub mod keys {
    use uuid::Uuid;

    pub fn lock(attempt_id: Uuid) -> String {
        format!("exam:lock:{}", attempt_id)
    }

    pub fn timer(attempt_id: Uuid) -> String {
        format!("exam:timer:{}", attempt_id)
    }

    pub fn heartbeat(attempt_id: Uuid) -> String {
        format!("exam:heartbeat:{}", attempt_id)
    }

    pub fn violations(attempt_id: Uuid) -> String {
        format!("exam:violations:{}", attempt_id)
    }
}

/// Session control bound to a coordination store.
#[derive(Clone)]
pub struct SessionControl {
    store: Arc<dyn CoordinationStore>,
    lock_ttl: Duration,
    heartbeat_ttl: Duration,
}

impl std::fmt::Debug for SessionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionControl")
            .field("lock_ttl", &self.lock_ttl)
            .field("heartbeat_ttl", &self.heartbeat_ttl)
            .finish_non_exhaustive()
    }
}

impl SessionControl {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            lock_ttl: DEFAULT_LOCK_TTL,
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
        }
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    /// Claims the session lock for an attempt.
    ///
    /// Returns false if a lock is already held. The lock is not reentrant
    /// and is never released; it lapses when its TTL runs out.
    pub async fn acquire_lock(&self, attempt_id: Uuid) -> Result<bool, StoreError> {
        let acquired = self
            .store
            .set_nx_ex(&keys::lock(attempt_id), "locked", self.lock_ttl)
            .await?;

        if acquired {
            debug!(attempt_id = %attempt_id, "Session lock acquired");
        } else {
            warn!(attempt_id = %attempt_id, "Session lock already held");
        }
        Ok(acquired)
    }

    /// Starts (or restarts) the authoritative exam timer.
    pub async fn start_timer(&self, attempt_id: Uuid, duration: Duration) -> Result<(), StoreError> {
        self.store
            .set_ex(&keys::timer(attempt_id), "running", duration)
            .await
    }

    /// Locks the session and starts its timer.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::LockContention` if another session already
    /// holds the lock; the timer is left untouched in that case.
    pub async fn begin_attempt(&self, attempt_id: Uuid, duration: Duration) -> PipelineResult<()> {
        if !self.acquire_lock(attempt_id).await? {
            return Err(PipelineError::LockContention { attempt_id });
        }
        self.start_timer(attempt_id, duration).await?;
        info!(
            attempt_id = %attempt_id,
            duration_secs = duration.as_secs(),
            "Exam attempt started"
        );
        Ok(())
    }

    /// Time left on the exam timer, read live from the store.
    ///
    /// `None` means the timer is missing or has no future expiry.
    pub async fn remaining_time(&self, attempt_id: Uuid) -> Result<Option<Duration>, StoreError> {
        Ok(self.store.ttl(&keys::timer(attempt_id)).await?.remaining())
    }

    pub async fn is_expired(&self, attempt_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.remaining_time(attempt_id).await?.is_none())
    }

    /// Refreshes the liveness marker. Does not touch the timer.
    pub async fn heartbeat(&self, attempt_id: Uuid) -> Result<(), StoreError> {
        self.store
            .set_ex(&keys::heartbeat(attempt_id), "alive", self.heartbeat_ttl)
            .await
    }

    /// True while a heartbeat has been seen within the heartbeat TTL.
    pub async fn is_alive(&self, attempt_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .store
            .ttl(&keys::heartbeat(attempt_id))
            .await?
            .remaining()
            .is_some())
    }

    /// Increments the counter for one violation type and returns its new value.
    pub async fn record_violation(
        &self,
        attempt_id: Uuid,
        violation_type: &str,
    ) -> Result<i64, StoreError> {
        let violation_type = violation_type.trim();
        if violation_type.is_empty() {
            return Err(StoreError::InvalidValue {
                key: keys::violations(attempt_id),
                message: "violation type must not be empty".to_string(),
            });
        }

        let count = self
            .store
            .hincr(&keys::violations(attempt_id), violation_type, 1)
            .await?;
        debug!(attempt_id = %attempt_id, violation_type, count, "Violation recorded");
        Ok(count)
    }

    /// Per-type violation counters for an attempt.
    pub async fn violation_counts(&self, attempt_id: Uuid) -> Result<HashMap<String, i64>, StoreError> {
        self.store.hgetall(&keys::violations(attempt_id)).await
    }

    /// Sum of all per-type counters.
    pub async fn violation_total(&self, attempt_id: Uuid) -> Result<i64, StoreError> {
        Ok(self.violation_counts(attempt_id).await?.values().sum())
    }
}
