//! In-memory repositories for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    ExamRepository, GenerationStatus, JobStatus, QuestionRecord, QuizRepository, StorageError,
    ViolationRecord,
};
use crate::quiz::Question;
use crate::results::{Answer, ExamResult};

/// A job record as held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub quiz_id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// A draft question inserted by the quiz creation job.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftQuestion {
    pub id: Uuid,
    pub section_id: Uuid,
    pub question: Question,
}

#[derive(Debug, Default)]
struct Tables {
    questions: HashMap<Uuid, QuestionRecord>,
    answers: Vec<Answer>,
    violations: Vec<ViolationRecord>,
    results: HashMap<Uuid, ExamResult>,
    quizzes: HashMap<Uuid, GenerationStatus>,
    sections: Vec<(Uuid, Uuid)>,
    drafts: Vec<DraftQuestion>,
    jobs: HashMap<Uuid, JobRecord>,
}

/// Both repositories over shared in-process tables.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_question(&self, question: QuestionRecord) {
        self.tables().questions.insert(question.id, question);
    }

    pub fn add_answer(&self, answer: Answer) {
        self.tables().answers.push(answer);
    }

    /// Registers a quiz with one section and returns the section id.
    pub fn add_quiz(&self, quiz_id: Uuid) -> Uuid {
        let section_id = Uuid::new_v4();
        let mut tables = self.tables();
        tables.quizzes.insert(quiz_id, GenerationStatus::NotStarted);
        tables.sections.push((quiz_id, section_id));
        section_id
    }

    /// Registers a quiz that has no sections.
    pub fn add_empty_quiz(&self, quiz_id: Uuid) {
        self.tables()
            .quizzes
            .insert(quiz_id, GenerationStatus::NotStarted);
    }

    pub fn generation_status(&self, quiz_id: Uuid) -> Option<GenerationStatus> {
        self.tables().quizzes.get(&quiz_id).copied()
    }

    pub fn drafts(&self) -> Vec<DraftQuestion> {
        self.tables().drafts.clone()
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.tables().jobs.values().cloned().collect()
    }

    pub fn result_count(&self) -> usize {
        self.tables().results.len()
    }
}

#[async_trait]
impl ExamRepository for MemoryRepository {
    async fn find_question(&self, id: Uuid) -> Result<Option<QuestionRecord>, StorageError> {
        Ok(self.tables().questions.get(&id).cloned())
    }

    async fn answers_for_attempt(&self, attempt_id: Uuid) -> Result<Vec<Answer>, StorageError> {
        Ok(self
            .tables()
            .answers
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn violations_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<ViolationRecord>, StorageError> {
        Ok(self
            .tables()
            .violations
            .iter()
            .filter(|v| v.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn record_violation(
        &self,
        attempt_id: Uuid,
        violation_type: &str,
    ) -> Result<(), StorageError> {
        self.tables().violations.push(ViolationRecord {
            attempt_id,
            violation_type: violation_type.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn find_result(&self, attempt_id: Uuid) -> Result<Option<ExamResult>, StorageError> {
        Ok(self.tables().results.get(&attempt_id).cloned())
    }

    async fn insert_result(&self, result: &ExamResult) -> Result<bool, StorageError> {
        let mut tables = self.tables();
        if tables.results.contains_key(&result.attempt_id) {
            return Ok(false);
        }
        tables.results.insert(result.attempt_id, result.clone());
        Ok(true)
    }
}

#[async_trait]
impl QuizRepository for MemoryRepository {
    async fn create_job(&self, quiz_id: Uuid, job_type: &str) -> Result<Uuid, StorageError> {
        let job_id = Uuid::new_v4();
        self.tables().jobs.insert(
            job_id,
            JobRecord {
                quiz_id,
                job_type: job_type.to_string(),
                status: JobStatus::Processing,
                error: None,
            },
        );
        Ok(job_id)
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables();
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::InvalidRecord(format!("job {} not found", job_id)))?;
        job.status = status;
        if let Some(error) = error {
            job.error = Some(error.to_string());
        }
        Ok(())
    }

    async fn set_generation_status(
        &self,
        quiz_id: Uuid,
        status: GenerationStatus,
    ) -> Result<bool, StorageError> {
        Ok(match self.tables().quizzes.get_mut(&quiz_id) {
            Some(current) => {
                *current = status;
                true
            }
            None => false,
        })
    }

    async fn first_section(&self, quiz_id: Uuid) -> Result<Option<Uuid>, StorageError> {
        Ok(self
            .tables()
            .sections
            .iter()
            .find(|(quiz, _)| *quiz == quiz_id)
            .map(|(_, section)| *section))
    }

    async fn insert_questions(
        &self,
        section_id: Uuid,
        questions: &[Question],
    ) -> Result<Vec<Uuid>, StorageError> {
        let mut tables = self.tables();
        let mut ids = Vec::with_capacity(questions.len());
        for question in questions {
            let id = Uuid::new_v4();
            tables.drafts.push(DraftQuestion {
                id,
                section_id,
                question: question.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }
}
