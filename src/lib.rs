//! quiz-forge: background pipelines and session primitives for an online
//! exam platform.
//!
//! - [`quiz`]: turns extracted document text into draft questions
//!   (summarize, enhance, generate, and an answer-key pass when needed).
//! - [`results`]: scores a submitted attempt (objective matching,
//!   agent-graded short answers, aggregation with an integrity flag).
//! - [`session`]: lock, timer, heartbeat and violation counters over a
//!   key-value store with atomic set-if-absent.
//! - [`workflow`]: the small graph engine both pipelines run on.
//! - [`jobs`]: job-level wrappers that persist pipeline outcomes.

pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod metrics;
pub mod quiz;
pub mod results;
pub mod session;
pub mod storage;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export commonly used error types
pub use error::{AgentError, LlmError, PipelineError, PipelineResult};
