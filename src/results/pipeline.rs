//! Result processing workflow: objective -> short_answer -> aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::prompts;
use super::types::{
    integrity_flag, EvaluationScore, ExamResult, GradingOutput, ResultStatus, ShortAnswerItem,
};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::StructuredAgent;
use crate::metrics;
use crate::quiz::ANSWER_UNAVAILABLE;
use crate::storage::ExamRepository;
use crate::workflow::{
    CompiledGraph, GraphError, Node, StateGraph, Target, WorkflowError, WorkflowState,
};

pub const PIPELINE_NAME: &str = "result_processing";

pub const OBJECTIVE: &str = "objective";
pub const SHORT_ANSWER: &str = "short_answer";
pub const AGGREGATE: &str = "aggregate";

/// Running state of a result processing run.
#[derive(Debug, Clone)]
pub struct ResultState {
    pub attempt_id: Uuid,
    pub objective_score: u32,
    pub short_answer_payload: Vec<ShortAnswerItem>,
    pub short_answer_scores: Vec<EvaluationScore>,
    pub review_required: bool,
    pub violation_count: u32,
    pub final_score: u32,
    pub result: Option<ExamResult>,
}

impl ResultState {
    pub fn new(attempt_id: Uuid) -> Self {
        Self {
            attempt_id,
            objective_score: 0,
            short_answer_payload: Vec::new(),
            short_answer_scores: Vec::new(),
            review_required: false,
            violation_count: 0,
            final_score: 0,
            result: None,
        }
    }
}

/// The fields a result node may set.
#[derive(Debug)]
pub enum ResultUpdate {
    Objective {
        objective_score: u32,
        short_answer_payload: Vec<ShortAnswerItem>,
        review_required: bool,
    },
    ShortAnswerScores(Vec<EvaluationScore>),
    Aggregate(ExamResult),
}

impl WorkflowState for ResultState {
    type Update = ResultUpdate;

    fn apply(&mut self, update: ResultUpdate) {
        match update {
            ResultUpdate::Objective {
                objective_score,
                short_answer_payload,
                review_required,
            } => {
                self.objective_score = objective_score;
                self.short_answer_payload = short_answer_payload;
                self.review_required = review_required;
            }
            ResultUpdate::ShortAnswerScores(scores) => self.short_answer_scores = scores,
            ResultUpdate::Aggregate(result) => {
                self.final_score = result.final_score;
                self.violation_count = result.violation_count;
                self.result = Some(result);
            }
        }
    }
}

fn matches_key(answer: &str, key: &str) -> bool {
    answer.trim().to_lowercase() == key.trim().to_lowercase()
}

struct Objective {
    repository: Arc<dyn ExamRepository>,
}

#[async_trait]
impl Node<ResultState> for Objective {
    async fn run(&self, state: &ResultState) -> PipelineResult<ResultUpdate> {
        let answers = self.repository.answers_for_attempt(state.attempt_id).await?;

        let mut objective_score = 0;
        let mut review_required = false;
        let mut short_answer_payload = Vec::new();

        for answer in answers {
            let Some(question) = self.repository.find_question(answer.question_id).await? else {
                warn!(
                    attempt_id = %state.attempt_id,
                    question_id = %answer.question_id,
                    "Answer references a missing question, skipping"
                );
                continue;
            };

            let Some(kind) = question.kind() else {
                warn!(
                    question_id = %question.id,
                    question_type = %question.question_type,
                    "Unknown question type, skipping"
                );
                continue;
            };

            if !kind.is_objective() {
                short_answer_payload.push(ShortAnswerItem {
                    question_id: question.id,
                    question_text: question.question_text,
                    student_answer: answer.answer_text.unwrap_or_default(),
                    reference_answer: question.correct_answer,
                    max_marks: question.marks,
                });
                continue;
            }

            let key = question
                .correct_answer
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case(ANSWER_UNAVAILABLE));
            let Some(key) = key else {
                // No usable answer key: no penalty, a professor decides.
                review_required = true;
                continue;
            };

            if answer
                .answer_text
                .as_deref()
                .is_some_and(|text| matches_key(text, key))
            {
                objective_score += question.marks;
            }
        }

        debug!(
            attempt_id = %state.attempt_id,
            objective_score,
            staged = short_answer_payload.len(),
            review_required,
            "Objective scoring done"
        );

        Ok(ResultUpdate::Objective {
            objective_score,
            short_answer_payload,
            review_required,
        })
    }
}

struct ShortAnswer {
    agent: StructuredAgent,
}

#[async_trait]
impl Node<ResultState> for ShortAnswer {
    async fn run(&self, state: &ResultState) -> PipelineResult<ResultUpdate> {
        if state.short_answer_payload.is_empty() {
            return Ok(ResultUpdate::ShortAnswerScores(Vec::new()));
        }

        let output: GradingOutput = self
            .agent
            .call(
                SHORT_ANSWER,
                &prompts::grade_short_answers(&state.short_answer_payload),
            )
            .await?;

        let scores = reconcile_scores(&state.short_answer_payload, output.results)?;
        Ok(ResultUpdate::ShortAnswerScores(scores))
    }
}

/// Checks grading output against the staged payload.
///
/// Every staged question must be scored exactly once and nothing else may be
/// scored. `max_marks` is taken from the payload, not from the agent.
pub fn reconcile_scores(
    payload: &[ShortAnswerItem],
    scores: Vec<EvaluationScore>,
) -> PipelineResult<Vec<EvaluationScore>> {
    let mut by_id: HashMap<Uuid, EvaluationScore> = HashMap::with_capacity(scores.len());
    for score in scores {
        let id = score.question_id;
        if by_id.insert(id, score).is_some() {
            return Err(PipelineError::SchemaValidation(format!(
                "question {} scored more than once",
                id
            )));
        }
    }

    let mut reconciled = Vec::with_capacity(payload.len());
    for item in payload {
        let score = by_id.remove(&item.question_id).ok_or_else(|| {
            PipelineError::SchemaValidation(format!("question {} was not scored", item.question_id))
        })?;
        if score.awarded_marks > item.max_marks {
            return Err(PipelineError::SchemaValidation(format!(
                "question {} awarded {} of {} marks",
                item.question_id, score.awarded_marks, item.max_marks
            )));
        }
        reconciled.push(EvaluationScore {
            max_marks: item.max_marks,
            ..score
        });
    }

    if let Some(extra) = by_id.keys().next() {
        return Err(PipelineError::SchemaValidation(format!(
            "question {} was scored but never submitted",
            extra
        )));
    }

    Ok(reconciled)
}

struct Aggregate {
    repository: Arc<dyn ExamRepository>,
}

#[async_trait]
impl Node<ResultState> for Aggregate {
    async fn run(&self, state: &ResultState) -> PipelineResult<ResultUpdate> {
        let short_answer_total: u32 = state
            .short_answer_scores
            .iter()
            .map(|s| s.awarded_marks)
            .sum();
        let final_score = state.objective_score + short_answer_total;

        // The persisted log is authoritative for the final result.
        let violations = self
            .repository
            .violations_for_attempt(state.attempt_id)
            .await?;
        let violation_count = u32::try_from(violations.len()).unwrap_or(u32::MAX);

        let status = if state.review_required {
            ResultStatus::PendingProfessorReview
        } else {
            ResultStatus::Completed
        };

        let result = ExamResult {
            attempt_id: state.attempt_id,
            final_score,
            violation_count,
            integrity_flag: integrity_flag(violation_count),
            status,
        };

        if !self.repository.insert_result(&result).await? {
            return Err(PipelineError::PersistenceConflict {
                attempt_id: state.attempt_id,
            });
        }

        info!(
            attempt_id = %state.attempt_id,
            final_score,
            violation_count,
            integrity_flag = result.integrity_flag,
            status = %status,
            "Result persisted"
        );
        Ok(ResultUpdate::Aggregate(result))
    }
}

/// Compiled result processing workflow.
#[derive(Debug)]
pub struct ResultProcessingPipeline {
    graph: CompiledGraph<ResultState>,
}

impl ResultProcessingPipeline {
    /// Builds the workflow around a shared agent client and repository.
    pub fn new(
        agent: StructuredAgent,
        repository: Arc<dyn ExamRepository>,
    ) -> Result<Self, GraphError> {
        Self::with_step_limit(agent, repository, crate::workflow::DEFAULT_STEP_LIMIT)
    }

    pub fn with_step_limit(
        agent: StructuredAgent,
        repository: Arc<dyn ExamRepository>,
        step_limit: usize,
    ) -> Result<Self, GraphError> {
        let graph = StateGraph::new(PIPELINE_NAME)
            .add_node(
                OBJECTIVE,
                Objective {
                    repository: repository.clone(),
                },
            )?
            .add_node(SHORT_ANSWER, ShortAnswer { agent })?
            .add_node(AGGREGATE, Aggregate { repository })?
            .set_entry(OBJECTIVE)
            .with_step_limit(step_limit)
            .add_edge(OBJECTIVE, Target::Node(SHORT_ANSWER))?
            .add_edge(SHORT_ANSWER, Target::Node(AGGREGATE))?
            .add_edge(AGGREGATE, Target::End)?
            .compile()?;

        Ok(Self { graph })
    }

    /// Scores an attempt and persists its result.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NodeFailed`; a result that already exists for
    /// the attempt surfaces as `PipelineError::PersistenceConflict` from
    /// `aggregate`.
    pub async fn run(&self, attempt_id: Uuid) -> Result<ResultState, WorkflowError> {
        info!(attempt_id = %attempt_id, "Starting result processing");

        match self.graph.invoke(ResultState::new(attempt_id)).await {
            Ok(execution) => {
                metrics::record_pipeline_run(PIPELINE_NAME, "success");
                Ok(execution.state)
            }
            Err(err) => {
                metrics::record_pipeline_run(PIPELINE_NAME, "failure");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Answer;
    use crate::storage::{MemoryRepository, QuestionRecord};
    use crate::testing::{scripted_agent, ScriptedProvider};

    struct Fixture {
        repo: Arc<MemoryRepository>,
        attempt_id: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                repo: Arc::new(MemoryRepository::new()),
                attempt_id: Uuid::new_v4(),
            }
        }

        fn answer(&self, kind: &str, key: Option<&str>, marks: u32, response: Option<&str>) -> Uuid {
            let question_id = Uuid::new_v4();
            self.repo.add_question(QuestionRecord {
                id: question_id,
                question_text: format!("{} question", kind),
                question_type: kind.to_string(),
                correct_answer: key.map(str::to_string),
                marks,
            });
            self.repo.add_answer(Answer {
                attempt_id: self.attempt_id,
                question_id,
                answer_text: response.map(str::to_string),
            });
            question_id
        }

        fn pipeline(&self, provider: Arc<ScriptedProvider>) -> ResultProcessingPipeline {
            ResultProcessingPipeline::new(scripted_agent(provider), self.repo.clone()).unwrap()
        }
    }

    fn grading_reply(scores: &[(Uuid, u32, u32)]) -> String {
        let results: Vec<_> = scores
            .iter()
            .map(|(id, awarded, max)| {
                serde_json::json!({
                    "question_id": id,
                    "awarded_marks": awarded,
                    "max_marks": max,
                    "confidence": "high"
                })
            })
            .collect();
        serde_json::json!({ "results": results }).to_string()
    }

    #[tokio::test]
    async fn test_no_answers_completes_with_zero() {
        let fixture = Fixture::new();
        let provider = ScriptedProvider::new(&[]);

        let state = fixture.pipeline(provider.clone()).run(fixture.attempt_id).await.unwrap();
        let result = state.result.unwrap();
        assert_eq!(result.final_score, 0);
        assert!(!state.review_required);
        assert_eq!(result.status, ResultStatus::Completed);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_objective_matching_ignores_case_and_whitespace() {
        let fixture = Fixture::new();
        fixture.answer("one_word", Some("Paris "), 2, Some("paris"));
        fixture.answer("true_false", Some("True"), 1, Some(" TRUE"));
        fixture.answer("mcq", Some("Mitochondria"), 3, Some("Ribosome"));
        fixture.answer("mcq", Some("B"), 1, None);

        let state = fixture
            .pipeline(ScriptedProvider::new(&[]))
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert_eq!(state.objective_score, 3);
        assert_eq!(state.final_score, 3);
        assert_eq!(state.result.unwrap().status, ResultStatus::Completed);
    }

    #[tokio::test]
    async fn test_unavailable_key_forces_review_without_penalty() {
        let fixture = Fixture::new();
        fixture.answer("mcq", Some(ANSWER_UNAVAILABLE), 4, Some("anything"));
        fixture.answer("one_word", None, 1, Some("x"));
        fixture.answer("mcq", Some("A"), 2, Some("a"));

        let state = fixture
            .pipeline(ScriptedProvider::new(&[]))
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert!(state.review_required);
        assert_eq!(state.final_score, 2);
        assert_eq!(
            state.result.unwrap().status,
            ResultStatus::PendingProfessorReview
        );
    }

    #[tokio::test]
    async fn test_sentinel_key_matched_case_insensitively() {
        let fixture = Fixture::new();
        fixture.answer("true_false", Some("ANSWER_UNAVAILABLE"), 1, Some("answer_unavailable"));

        let state = fixture
            .pipeline(ScriptedProvider::new(&[]))
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert!(state.review_required);
        assert_eq!(state.final_score, 0);
    }

    #[tokio::test]
    async fn test_short_answers_graded_in_one_call() {
        let fixture = Fixture::new();
        fixture.answer("mcq", Some("A"), 1, Some("A"));
        let q1 = fixture.answer("short_answer", Some("Light to chemical energy"), 5, Some("Plants use light"));
        let q2 = fixture.answer("short_answer", None, 3, Some("Chlorophyll absorbs light"));

        // The agent misreports max_marks for q2; the staged value wins.
        let reply = grading_reply(&[(q1, 4, 5), (q2, 2, 10)]);
        let provider = ScriptedProvider::new(&[&reply]);

        let state = fixture
            .pipeline(provider.clone())
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(state.short_answer_payload.len(), 2);
        assert_eq!(state.final_score, 1 + 4 + 2);

        let q2_score = state
            .short_answer_scores
            .iter()
            .find(|s| s.question_id == q2)
            .unwrap();
        assert_eq!(q2_score.max_marks, 3);

        let prompt = provider.prompt(0).unwrap();
        assert!(prompt.contains("Plants use light"));
        assert!(prompt.contains("Light to chemical energy"));
    }

    #[tokio::test]
    async fn test_award_checked_against_staged_max() {
        let fixture = Fixture::new();
        let q1 = fixture.answer("short_answer", Some("Glucose and oxygen"), 5, Some("Sugar"));

        // The agent echoes a max below the award; the staged 5 marks decide.
        let reply = grading_reply(&[(q1, 4, 3)]);
        let provider = ScriptedProvider::new(&[&reply]);

        let state = fixture
            .pipeline(provider.clone())
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert_eq!(state.final_score, 4);
        assert_eq!(state.short_answer_scores[0].max_marks, 5);
        assert_eq!(fixture.repo.result_count(), 1);
    }

    #[tokio::test]
    async fn test_award_above_staged_max_is_schema_failure() {
        let fixture = Fixture::new();
        let q1 = fixture.answer("short_answer", None, 2, Some("Sugar"));

        let reply = grading_reply(&[(q1, 3, 10)]);
        let err = fixture
            .pipeline(ScriptedProvider::new(&[&reply]))
            .run(fixture.attempt_id)
            .await
            .unwrap_err();

        assert!(matches!(err.pipeline_error(), Some(PipelineError::SchemaValidation(_))));
        assert_eq!(fixture.repo.result_count(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_grading_is_schema_failure() {
        let fixture = Fixture::new();
        let q1 = fixture.answer("short_answer", None, 5, Some("a"));
        fixture.answer("short_answer", None, 5, Some("b"));

        let reply = grading_reply(&[(q1, 3, 5)]);
        let err = fixture
            .pipeline(ScriptedProvider::new(&[&reply]))
            .run(fixture.attempt_id)
            .await
            .unwrap_err();

        assert_eq!(err.failed_node(), Some(SHORT_ANSWER));
        assert!(matches!(err.pipeline_error(), Some(PipelineError::SchemaValidation(_))));
        assert_eq!(fixture.repo.result_count(), 0);
    }

    #[tokio::test]
    async fn test_integrity_flag_uses_persisted_violations() {
        for (count, flagged) in [(3, false), (4, true)] {
            let fixture = Fixture::new();
            for _ in 0..count {
                fixture
                    .repo
                    .record_violation(fixture.attempt_id, "tab_switch")
                    .await
                    .unwrap();
            }

            let result = fixture
                .pipeline(ScriptedProvider::new(&[]))
                .run(fixture.attempt_id)
                .await
                .unwrap()
                .result
                .unwrap();
            assert_eq!(result.violation_count, count);
            assert_eq!(result.integrity_flag, flagged);
        }
    }

    #[tokio::test]
    async fn test_second_run_is_persistence_conflict() {
        let fixture = Fixture::new();
        fixture.answer("mcq", Some("A"), 1, Some("A"));
        let pipeline = fixture.pipeline(ScriptedProvider::new(&[]));

        pipeline.run(fixture.attempt_id).await.unwrap();
        let err = pipeline.run(fixture.attempt_id).await.unwrap_err();

        assert_eq!(err.failed_node(), Some(AGGREGATE));
        assert!(matches!(
            err.pipeline_error(),
            Some(PipelineError::PersistenceConflict { attempt_id }) if *attempt_id == fixture.attempt_id
        ));
        assert_eq!(fixture.repo.result_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_question_is_skipped() {
        let fixture = Fixture::new();
        fixture.repo.add_answer(Answer {
            attempt_id: fixture.attempt_id,
            question_id: Uuid::new_v4(),
            answer_text: Some("orphan".to_string()),
        });
        fixture.answer("mcq", Some("A"), 2, Some("A"));

        let state = fixture
            .pipeline(ScriptedProvider::new(&[]))
            .run(fixture.attempt_id)
            .await
            .unwrap();
        assert_eq!(state.final_score, 2);
    }

    #[test]
    fn test_reconcile_rejects_unknown_and_duplicate_ids() {
        let item = ShortAnswerItem {
            question_id: Uuid::new_v4(),
            question_text: "Q".to_string(),
            student_answer: "A".to_string(),
            reference_answer: None,
            max_marks: 2,
        };
        let score = |id: Uuid| EvaluationScore {
            question_id: id,
            awarded_marks: 1,
            max_marks: 2,
            confidence: "high".to_string(),
        };

        let dup = reconcile_scores(
            std::slice::from_ref(&item),
            vec![score(item.question_id), score(item.question_id)],
        );
        assert!(matches!(dup, Err(PipelineError::SchemaValidation(_))));

        let extra = reconcile_scores(
            std::slice::from_ref(&item),
            vec![score(item.question_id), score(Uuid::new_v4())],
        );
        assert!(matches!(extra, Err(PipelineError::SchemaValidation(_))));
    }
}
