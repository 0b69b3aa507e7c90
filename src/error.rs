//! Error types for quiz-forge operations.
//!
//! Defines the error taxonomy shared by both pipelines:
//! - LLM transport failures (`LlmError`)
//! - Structured agent calls (`AgentError`)
//! - Pipeline node failures (`PipelineError`)
//!
//! Subsystem-specific errors (workflow construction, coordination store,
//! data access, configuration) live next to the code that raises them and
//! convert into `PipelineError` where a node can surface them.

use thiserror::Error;
use uuid::Uuid;

use crate::session::StoreError;
use crate::storage::StorageError;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised at the structured agent boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The response could not be parsed into the expected output shape.
    #[error("Agent '{agent}' returned output that does not match the expected shape: {reason}")]
    SchemaValidation { agent: String, reason: String },

    /// Transport failure talking to the model provider.
    #[error("Agent '{agent}' upstream failure: {reason}")]
    Upstream { agent: String, reason: String },

    /// The call did not complete within the configured timeout.
    #[error("Agent '{agent}' timed out after {seconds} seconds")]
    Timeout { agent: String, seconds: u64 },
}

impl AgentError {
    /// Returns true if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Upstream { .. } | AgentError::Timeout { .. })
    }
}

/// Errors raised by pipeline nodes.
///
/// Any of these aborts the owning pipeline run; the invoking job decides
/// what to do with the failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required pipeline input is absent.
    #[error("Required input missing: {0}")]
    InputMissing(String),

    /// The agent returned empty or unusable output.
    #[error("Agent produced unusable output: {0}")]
    AgentFailure(String),

    /// The agent output does not match the expected shape.
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// A result already exists for this attempt.
    #[error("A result already exists for attempt {attempt_id}")]
    PersistenceConflict { attempt_id: Uuid },

    /// The exam session for this attempt is already locked.
    #[error("Multiple sessions detected for attempt {attempt_id}")]
    LockContention { attempt_id: Uuid },

    /// The agent transport failed or timed out.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Data access failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Coordination store failed.
    #[error("Coordination store error: {0}")]
    Coordination(#[from] StoreError),
}

impl From<AgentError> for PipelineError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::SchemaValidation { .. } => PipelineError::SchemaValidation(err.to_string()),
            AgentError::Upstream { .. } | AgentError::Timeout { .. } => {
                PipelineError::Upstream(err.to_string())
            }
        }
    }
}

/// Result type alias for pipeline node operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
