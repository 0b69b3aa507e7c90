//! Result processing pipeline.
//!
//! Scores a submitted attempt and persists exactly one result for it:
//!
//! 1. `objective`: exact-match scoring of mcq / true_false / one_word answers;
//!    short answers are staged for grading
//! 2. `short_answer`: one grading agent call for all staged answers
//! 3. `aggregate`: final score, violation count, integrity flag, status, insert

pub mod pipeline;
pub mod prompts;
pub mod types;

pub use pipeline::{reconcile_scores, ResultProcessingPipeline, ResultState, ResultUpdate};
pub use types::{
    integrity_flag, Answer, EvaluationScore, ExamResult, GradingOutput, ResultStatus,
    ShortAnswerItem, INTEGRITY_THRESHOLD,
};
