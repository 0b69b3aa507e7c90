//! Exam session concurrency control.
//!
//! Cross-invocation coordination for live exams: a session lock that stops a
//! second client from opening the same attempt, a TTL-based timer, a
//! heartbeat marker and per-type violation counters. All of it lives in a
//! key-value store reached through [`CoordinationStore`]:
//!
//! - [`RedisStore`]: production store on a Redis `ConnectionManager`
//! - [`MemoryStore`]: single-process store for tests and local runs
//!
//! Key layout:
//!
//! - `exam:lock:{attempt_id}`: session lock (string, TTL)
//! - `exam:timer:{attempt_id}`: exam timer (string, TTL is the remaining time)
//! - `exam:heartbeat:{attempt_id}`: liveness marker (string, short TTL)
//! - `exam:violations:{attempt_id}`: violation counters (hash, type -> count)

pub mod control;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use control::{keys, SessionControl, DEFAULT_HEARTBEAT_TTL, DEFAULT_LOCK_TTL};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CoordinationStore, KeyTtl, StoreError};
