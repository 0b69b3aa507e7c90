//! Quiz domain types and agent output shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::OutputShape;

/// Marker stored in `correct_answer` when no answer could be determined.
pub const ANSWER_UNAVAILABLE: &str = "answer_unavailable";

/// Kind of question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum QuestionType {
    Mcq,
    TrueFalse,
    OneWord,
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::TrueFalse => "true_false",
            QuestionType::OneWord => "one_word",
            QuestionType::ShortAnswer => "short_answer",
        }
    }

    /// Objective questions are scored by exact match against the answer key.
    pub fn is_objective(&self) -> bool {
        !matches!(self, QuestionType::ShortAnswer)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    /// Accepts any casing and `-`/space separators ("MCQ", "true-false").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "mcq" => Ok(QuestionType::Mcq),
            "true_false" => Ok(QuestionType::TrueFalse),
            "one_word" => Ok(QuestionType::OneWord),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            _ => Err(format!("unknown question type '{}'", s)),
        }
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Overall difficulty of a document or a requested quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A generated question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    pub marks: u32,
}

impl Question {
    /// True if `correct_answer` holds something, including the sentinel.
    pub fn has_answer(&self) -> bool {
        self.correct_answer
            .as_deref()
            .is_some_and(|answer| !answer.trim().is_empty())
    }

    pub fn is_answer_unavailable(&self) -> bool {
        self.correct_answer.as_deref() == Some(ANSWER_UNAVAILABLE)
    }
}

/// Constraints for a quiz: how many questions, which types, how hard.
///
/// Unknown keys are carried through untouched in `extra` and shown to the
/// enhance agent alongside the typed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<QuestionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Blueprint {
    pub fn is_empty(&self) -> bool {
        self.count.is_none() && self.types.is_empty() && self.difficulty.is_none() && self.extra.is_empty()
    }
}

/// Output of the summarize agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub difficulty_level: Difficulty,
}

impl OutputShape for DocumentSummary {
    const SHAPE: &'static str = "DocumentSummary";

    fn validate(&self) -> Result<(), String> {
        if self.summary.trim().chars().count() < 10 {
            return Err("summary must be at least 10 characters".to_string());
        }
        if self.key_topics.iter().all(|t| t.trim().is_empty()) {
            return Err("at least one key topic is required".to_string());
        }
        Ok(())
    }
}

/// Output of the enhance agent.
#[derive(Debug, Clone, Deserialize)]
pub struct EnhancedPrompt {
    pub enhanced_prompt: String,
}

impl OutputShape for EnhancedPrompt {
    const SHAPE: &'static str = "EnhancedPrompt";
}

/// Output of the generate agent.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuestions {
    pub questions: Vec<Question>,
}

impl OutputShape for GeneratedQuestions {
    const SHAPE: &'static str = "QuizGenerationOutput";

    fn validate(&self) -> Result<(), String> {
        for (index, question) in self.questions.iter().enumerate() {
            if question.question_text.trim().is_empty() {
                return Err(format!("question {} has empty text", index + 1));
            }
            if question.marks == 0 {
                return Err(format!("question {} has zero marks", index + 1));
            }
        }
        Ok(())
    }
}

/// One entry echoed back by the answer key agent.
///
/// Only `correct_answer` is used; the rest of the question always comes from
/// the generator's output.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerKeyEntry {
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// Output of the answer key agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerKeyOutput {
    pub questions: Vec<AnswerKeyEntry>,
}

impl OutputShape for AnswerKeyOutput {
    const SHAPE: &'static str = "AnswerKeyOutput";
}
