//! Quiz creation pipeline.
//!
//! Turns extracted document text and a blueprint into a list of draft
//! questions:
//!
//! 1. `summarize`: document summary, key topics, difficulty
//! 2. `enhance`: summary + blueprint + professor note -> one generation instruction
//! 3. `generate`: instruction -> questions
//! 4. `answer_key`: only if some question has no `correct_answer`
//!
//! Every question in the output has a non-empty `correct_answer`, which may be
//! the [`ANSWER_UNAVAILABLE`] marker.

pub mod pipeline;
pub mod prompts;
pub mod types;

pub use pipeline::{
    merge_answer_key, needs_answer_key, AnswerKeyRoute, QuizCreationPipeline, QuizInput,
    QuizOutput, QuizState, QuizUpdate,
};
pub use types::{Blueprint, Difficulty, DocumentSummary, Question, QuestionType, ANSWER_UNAVAILABLE};
