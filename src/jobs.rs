//! Background job wrappers around the pipelines.
//!
//! A dispatcher (queue, cron, CLI) decides *when* a job runs; these types
//! decide what happens to the owning records around a pipeline run. They
//! are safe to re-invoke: quiz creation starts over from scratch, and result
//! processing never writes a second result for an attempt.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::quiz::{QuizCreationPipeline, QuizInput, QuizOutput};
use crate::results::{ExamResult, ResultProcessingPipeline};
use crate::session::SessionControl;
use crate::storage::{ExamRepository, GenerationStatus, JobStatus, QuizRepository};
use crate::workflow::WorkflowError;

/// AI job type recorded for quiz creation.
pub const QUIZ_CREATION_JOB: &str = "QUIZ_CREATION";

/// Errors returned by a job run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl JobError {
    /// The underlying taxonomy error, wherever it was raised.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            JobError::Workflow(err) => err.pipeline_error(),
            JobError::Pipeline(err) => Some(err),
        }
    }
}

impl From<crate::storage::StorageError> for JobError {
    fn from(err: crate::storage::StorageError) -> Self {
        JobError::Pipeline(err.into())
    }
}

/// Outcome of a successful quiz creation job.
#[derive(Debug, Clone)]
pub struct QuizJobOutcome {
    pub job_id: Uuid,
    pub section_id: Uuid,
    pub question_ids: Vec<Uuid>,
    pub output: QuizOutput,
}

/// Runs the quiz creation pipeline and persists its questions as drafts.
pub struct QuizCreationJob {
    pipeline: QuizCreationPipeline,
    repository: Arc<dyn QuizRepository>,
}

impl std::fmt::Debug for QuizCreationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizCreationJob")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl QuizCreationJob {
    pub fn new(pipeline: QuizCreationPipeline, repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            pipeline,
            repository,
        }
    }

    /// Generates questions for a quiz.
    ///
    /// Creates an AI job record, marks the quiz `PROCESSING`, runs the
    /// pipeline, inserts the questions into the quiz's first section and
    /// marks the quiz `GENERATED`. On failure the job is marked `FAILED`
    /// with the error text and the quiz is left in `PROCESSING`.
    ///
    /// # Errors
    ///
    /// Returns `JobError` with the first failure; a missing quiz or section
    /// is `PipelineError::InputMissing`.
    pub async fn run(&self, quiz_id: Uuid, input: QuizInput) -> Result<QuizJobOutcome, JobError> {
        let job_id = self.repository.create_job(quiz_id, QUIZ_CREATION_JOB).await?;
        info!(quiz_id = %quiz_id, job_id = %job_id, "Quiz creation job started");

        match self.execute(quiz_id, job_id, input).await {
            Ok(outcome) => {
                self.repository
                    .finish_job(job_id, JobStatus::Completed, None)
                    .await?;
                info!(
                    quiz_id = %quiz_id,
                    job_id = %job_id,
                    questions = outcome.question_ids.len(),
                    "Quiz creation job completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(quiz_id = %quiz_id, job_id = %job_id, error = %err, "Quiz creation job failed");
                if let Err(mark_err) = self
                    .repository
                    .finish_job(job_id, JobStatus::Failed, Some(&err.to_string()))
                    .await
                {
                    warn!(job_id = %job_id, error = %mark_err, "Could not mark job as failed");
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        quiz_id: Uuid,
        job_id: Uuid,
        input: QuizInput,
    ) -> Result<QuizJobOutcome, JobError> {
        if !self
            .repository
            .set_generation_status(quiz_id, GenerationStatus::Processing)
            .await?
        {
            return Err(PipelineError::InputMissing(format!("quiz {}", quiz_id)).into());
        }

        let output = self.pipeline.run(input).await?;

        let section_id = self
            .repository
            .first_section(quiz_id)
            .await?
            .ok_or_else(|| PipelineError::InputMissing(format!("section for quiz {}", quiz_id)))?;

        let question_ids = self
            .repository
            .insert_questions(section_id, &output.questions)
            .await?;

        self.repository
            .set_generation_status(quiz_id, GenerationStatus::Generated)
            .await?;

        Ok(QuizJobOutcome {
            job_id,
            section_id,
            question_ids,
            output,
        })
    }
}

/// Outcome of a result processing job.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultJobOutcome {
    /// This run created the result.
    Processed(ExamResult),
    /// A result already existed; nothing was written.
    AlreadyProcessed(ExamResult),
}

impl ResultJobOutcome {
    pub fn result(&self) -> &ExamResult {
        match self {
            ResultJobOutcome::Processed(result) | ResultJobOutcome::AlreadyProcessed(result) => {
                result
            }
        }
    }
}

/// Runs the result processing pipeline at most once per attempt.
pub struct ResultProcessingJob {
    pipeline: ResultProcessingPipeline,
    repository: Arc<dyn ExamRepository>,
    session: Option<SessionControl>,
}

impl std::fmt::Debug for ResultProcessingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultProcessingJob")
            .field("pipeline", &self.pipeline)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ResultProcessingJob {
    pub fn new(pipeline: ResultProcessingPipeline, repository: Arc<dyn ExamRepository>) -> Self {
        Self {
            pipeline,
            repository,
            session: None,
        }
    }

    /// Compares the live violation counters with the persisted log after
    /// each run. The persisted log still decides the stored count.
    pub fn with_session(mut self, session: SessionControl) -> Self {
        self.session = Some(session);
        self
    }

    /// Processes an attempt unless it already has a result.
    ///
    /// # Errors
    ///
    /// Returns `JobError` for any failure other than an existing result.
    pub async fn run(&self, attempt_id: Uuid) -> Result<ResultJobOutcome, JobError> {
        if let Some(existing) = self.repository.find_result(attempt_id).await? {
            info!(attempt_id = %attempt_id, "Result already exists, skipping");
            return Ok(ResultJobOutcome::AlreadyProcessed(existing));
        }

        let state = match self.pipeline.run(attempt_id).await {
            Ok(state) => state,
            Err(err) if is_conflict(&err) => {
                // Another run inserted between our check and our insert.
                warn!(attempt_id = %attempt_id, "Result created concurrently");
                let existing = self.repository.find_result(attempt_id).await?;
                return match existing {
                    Some(existing) => Ok(ResultJobOutcome::AlreadyProcessed(existing)),
                    None => Err(err.into()),
                };
            }
            Err(err) => return Err(err.into()),
        };

        let result = state
            .result
            .ok_or_else(|| PipelineError::InputMissing("result".to_string()))?;

        self.compare_live_violations(&result).await;
        Ok(ResultJobOutcome::Processed(result))
    }

    async fn compare_live_violations(&self, result: &ExamResult) {
        let Some(session) = &self.session else {
            return;
        };

        match session.violation_total(result.attempt_id).await {
            Ok(live) if live != i64::from(result.violation_count) => {
                warn!(
                    attempt_id = %result.attempt_id,
                    live,
                    persisted = result.violation_count,
                    "Live violation counter differs from persisted log"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(attempt_id = %result.attempt_id, error = %e, "Could not read live violation counter");
            }
        }
    }
}

fn is_conflict(err: &WorkflowError) -> bool {
    matches!(
        err.pipeline_error(),
        Some(PipelineError::PersistenceConflict { .. })
    )
}
