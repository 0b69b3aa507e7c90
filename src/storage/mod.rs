//! Data access for both pipelines.
//!
//! The relational schema is owned elsewhere; this module only reads and
//! writes the columns the pipelines need.
//!
//! - [`ExamRepository`]: answers, questions, violations and results of attempts
//! - [`QuizRepository`]: quiz generation status, sections, draft questions, AI jobs
//!
//! Implementations:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`
//! - [`MemoryRepository`]: in-process maps for tests and dry runs

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::quiz::{Question, QuestionType};
use crate::results::{Answer, ExamResult};

pub use memory::MemoryRepository;
pub use postgres::PgStore;

/// Errors that can occur during data access.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value the pipelines cannot interpret.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// A persisted question as the result pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub question_text: String,
    /// Raw type column; see [`QuestionRecord::kind`].
    pub question_type: String,
    pub correct_answer: Option<String>,
    pub marks: u32,
}

impl QuestionRecord {
    /// Parsed question type, or `None` for a type the pipelines do not know.
    pub fn kind(&self) -> Option<QuestionType> {
        self.question_type.parse().ok()
    }
}

/// One persisted proctoring violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub attempt_id: Uuid,
    pub violation_type: String,
    pub created_at: DateTime<Utc>,
}

/// Quiz-level AI generation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    NotStarted,
    Processing,
    Generated,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::NotStarted => "NOT_STARTED",
            GenerationStatus::Processing => "PROCESSING",
            GenerationStatus::Generated => "GENERATED",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an AI job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status given to questions inserted by the quiz creation job.
pub const DRAFT_STATUS: &str = "DRAFT";

/// Attempt-side data access.
#[async_trait]
pub trait ExamRepository: Send + Sync {
    async fn find_question(&self, id: Uuid) -> Result<Option<QuestionRecord>, StorageError>;

    async fn answers_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<Answer>, StorageError>;

    async fn violations_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<ViolationRecord>, StorageError>;

    /// Appends a violation to the persisted log.
    async fn record_violation(&self, attempt_id: Uuid, violation_type: &str)
        -> Result<(), StorageError>;

    async fn find_result(&self, attempt_id: Uuid) -> Result<Option<ExamResult>, StorageError>;

    /// Inserts a result unless one already exists for the attempt.
    ///
    /// Returns false, without writing, if a result already exists.
    async fn insert_result(&self, result: &ExamResult) -> Result<bool, StorageError>;
}

/// Quiz-side data access.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Creates an AI job record in `PROCESSING` state and returns its id.
    async fn create_job(&self, quiz_id: Uuid, job_type: &str) -> Result<Uuid, StorageError>;

    /// Moves a job to its final status, storing `error` in its metadata.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Sets a quiz's generation status. Returns false if the quiz does not exist.
    async fn set_generation_status(
        &self,
        quiz_id: Uuid,
        status: GenerationStatus,
    ) -> Result<bool, StorageError>;

    /// Id of the quiz's first section, if it has one.
    async fn first_section(&self, quiz_id: Uuid) -> Result<Option<Uuid>, StorageError>;

    /// Inserts questions as drafts into a section and returns their ids.
    async fn insert_questions(
        &self,
        section_id: Uuid,
        questions: &[Question],
    ) -> Result<Vec<Uuid>, StorageError>;
}
