//! Result processing domain types and grading output shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::OutputShape;

/// More violations than this flag an attempt.
pub const INTEGRITY_THRESHOLD: u32 = 3;

pub fn integrity_flag(violation_count: u32) -> bool {
    violation_count > INTEGRITY_THRESHOLD
}

/// A student's submitted response to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: Option<String>,
}

/// A short-answer response staged for the grading agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortAnswerItem {
    pub question_id: Uuid,
    pub question_text: String,
    pub student_answer: String,
    pub reference_answer: Option<String>,
    pub max_marks: u32,
}

/// Marks awarded to one short-answer response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub question_id: Uuid,
    pub awarded_marks: u32,
    pub max_marks: u32,
    #[serde(default = "default_confidence")]
    pub confidence: String,
}

fn default_confidence() -> String {
    "unknown".to_string()
}

/// Output of the grading agent.
#[derive(Debug, Clone, Deserialize)]
pub struct GradingOutput {
    pub results: Vec<EvaluationScore>,
}

// Marks are checked against the staged maximum in `reconcile_scores`; the
// agent's echoed `max_marks` is not trusted here.
impl OutputShape for GradingOutput {
    const SHAPE: &'static str = "ShortAnswerEvaluationOutput";
}

/// Final state of a processed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Completed,
    PendingProfessorReview,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Completed => "COMPLETED",
            ResultStatus::PendingProfessorReview => "PENDING_PROFESSOR_REVIEW",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(ResultStatus::Completed),
            "PENDING_PROFESSOR_REVIEW" => Ok(ResultStatus::PendingProfessorReview),
            other => Err(format!("unknown result status '{}'", other)),
        }
    }
}

/// The persisted outcome of an attempt. At most one exists per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub attempt_id: Uuid,
    pub final_score: u32,
    pub violation_count: u32,
    pub integrity_flag: bool,
    pub status: ResultStatus,
}
