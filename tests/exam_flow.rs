//! End-to-end flows over in-memory stores and a scripted agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{agent, enhance_reply, questions_reply, summary_reply, ScriptedProvider, PHOTOSYNTHESIS};
use quiz_forge::jobs::{QuizCreationJob, ResultJobOutcome, ResultProcessingJob};
use quiz_forge::quiz::{Blueprint, QuestionType, QuizCreationPipeline, QuizInput, ANSWER_UNAVAILABLE};
use quiz_forge::results::{Answer, ResultProcessingPipeline, ResultStatus};
use quiz_forge::session::{MemoryStore, SessionControl};
use quiz_forge::storage::{
    ExamRepository, GenerationStatus, JobStatus, MemoryRepository, QuestionRecord,
};
use quiz_forge::PipelineError;
use uuid::Uuid;

fn mcq_blueprint() -> Blueprint {
    Blueprint {
        count: Some(5),
        types: vec![QuestionType::Mcq],
        ..Blueprint::default()
    }
}

fn photosynthesis_input() -> QuizInput {
    QuizInput {
        extracted_text: PHOTOSYNTHESIS.to_string(),
        blueprint: mcq_blueprint(),
        professor_note: None,
    }
}

#[tokio::test]
async fn test_quiz_job_stores_five_drafts_without_answer_key_pass() {
    let provider = ScriptedProvider::new(vec![summary_reply(), enhance_reply(), questions_reply(5)]);
    let pipeline = QuizCreationPipeline::new(agent(provider.clone())).unwrap();
    let repo = Arc::new(MemoryRepository::new());
    let quiz_id = Uuid::new_v4();
    let section_id = repo.add_quiz(quiz_id);

    let job = QuizCreationJob::new(pipeline, repo.clone());
    let outcome = job.run(quiz_id, photosynthesis_input()).await.unwrap();

    assert_eq!(provider.calls(), 3);
    assert!(!outcome.output.answer_key_applied);
    assert_eq!(outcome.section_id, section_id);
    assert_eq!(outcome.question_ids.len(), 5);

    let drafts = repo.drafts();
    assert_eq!(drafts.len(), 5);
    assert!(drafts.iter().all(|d| d.section_id == section_id));
    assert!(drafts
        .iter()
        .all(|d| d.question.correct_answer.as_deref() == Some("Chlorophyll")));

    assert_eq!(repo.generation_status(quiz_id), Some(GenerationStatus::Generated));
    let jobs = repo.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn test_quiz_job_fills_missing_answers() {
    let answer_key = serde_json::json!({
        "questions": [
            {"correct_answer": "Chlorophyll"},
            {"correct_answer": "Chlorophyll"},
            {"correct_answer": "Chlorophyll"},
            {"correct_answer": "Oxygen"},
            {"correct_answer": null}
        ]
    })
    .to_string();
    let provider = ScriptedProvider::new(vec![
        summary_reply(),
        enhance_reply(),
        questions_reply(3),
        answer_key,
    ]);
    let pipeline = QuizCreationPipeline::new(agent(provider.clone())).unwrap();
    let repo = Arc::new(MemoryRepository::new());
    let quiz_id = Uuid::new_v4();
    repo.add_quiz(quiz_id);

    let outcome = QuizCreationJob::new(pipeline, repo.clone())
        .run(quiz_id, photosynthesis_input())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 4);
    assert!(outcome.output.answer_key_applied);
    let answers: Vec<Option<String>> = outcome
        .output
        .questions
        .iter()
        .map(|q| q.correct_answer.clone())
        .collect();
    assert_eq!(answers[3].as_deref(), Some("Oxygen"));
    assert_eq!(answers[4].as_deref(), Some(ANSWER_UNAVAILABLE));
    assert!(outcome.output.questions.iter().all(|q| q.has_answer()));
}

#[tokio::test]
async fn test_quiz_job_failure_marks_job_failed() {
    // Summary without key topics fails validation.
    let bad_summary = serde_json::json!({
        "summary": "A document about plants.",
        "key_topics": [],
        "difficulty_level": "easy"
    })
    .to_string();
    let provider = ScriptedProvider::new(vec![bad_summary]);
    let pipeline = QuizCreationPipeline::new(agent(provider.clone())).unwrap();
    let repo = Arc::new(MemoryRepository::new());
    let quiz_id = Uuid::new_v4();
    repo.add_quiz(quiz_id);

    let err = QuizCreationJob::new(pipeline, repo.clone())
        .run(quiz_id, photosynthesis_input())
        .await
        .unwrap_err();

    assert!(matches!(err.pipeline_error(), Some(PipelineError::SchemaValidation(_))));
    assert_eq!(provider.calls(), 1);
    assert!(repo.drafts().is_empty());
    assert_eq!(repo.jobs()[0].status, JobStatus::Failed);
    assert!(repo.jobs()[0].error.is_some());
}

fn question(repo: &MemoryRepository, kind: &str, key: Option<&str>, marks: u32) -> Uuid {
    let id = Uuid::new_v4();
    repo.add_question(QuestionRecord {
        id,
        question_text: format!("{} question", kind),
        question_type: kind.to_string(),
        correct_answer: key.map(str::to_string),
        marks,
    });
    id
}

fn answer(repo: &MemoryRepository, attempt_id: Uuid, question_id: Uuid, text: &str) {
    repo.add_answer(Answer {
        attempt_id,
        question_id,
        answer_text: Some(text.to_string()),
    });
}

#[tokio::test]
async fn test_result_job_scores_flags_and_is_idempotent() {
    let repo = Arc::new(MemoryRepository::new());
    let attempt_id = Uuid::new_v4();

    let q1 = question(&repo, "mcq", Some("Chlorophyll"), 2);
    let q2 = question(&repo, "true_false", Some("True"), 1);
    let q3 = question(&repo, "short_answer", Some("Light is converted to chemical energy"), 5);
    answer(&repo, attempt_id, q1, "  chlorophyll ");
    answer(&repo, attempt_id, q2, "False");
    answer(&repo, attempt_id, q3, "Plants turn light into sugar");

    for _ in 0..4 {
        repo.record_violation(attempt_id, "tab_switch").await.unwrap();
    }

    let grading = serde_json::json!({
        "results": [
            {"question_id": q3, "awarded_marks": 4, "max_marks": 5, "confidence": "high"}
        ]
    })
    .to_string();
    let provider = ScriptedProvider::new(vec![grading]);
    let repository: Arc<dyn ExamRepository> = repo.clone();
    let pipeline = ResultProcessingPipeline::new(agent(provider.clone()), repository.clone()).unwrap();

    let session = SessionControl::new(Arc::new(MemoryStore::new()));
    let job = ResultProcessingJob::new(pipeline, repository).with_session(session);

    let first = job.run(attempt_id).await.unwrap();
    let result = match &first {
        ResultJobOutcome::Processed(result) => result.clone(),
        other => panic!("expected a fresh result, got {:?}", other),
    };
    assert_eq!(result.final_score, 6);
    assert_eq!(result.violation_count, 4);
    assert!(result.integrity_flag);
    assert_eq!(result.status, ResultStatus::Completed);

    let second = job.run(attempt_id).await.unwrap();
    assert!(matches!(second, ResultJobOutcome::AlreadyProcessed(_)));
    assert_eq!(second.result(), &result);
    assert_eq!(provider.calls(), 1);
    assert_eq!(repo.result_count(), 1);
}

#[tokio::test]
async fn test_result_without_answer_key_goes_to_review() {
    let repo = Arc::new(MemoryRepository::new());
    let attempt_id = Uuid::new_v4();
    let q1 = question(&repo, "mcq", Some(ANSWER_UNAVAILABLE), 3);
    let q2 = question(&repo, "one_word", Some("ATP"), 1);
    answer(&repo, attempt_id, q1, "Oxygen");
    answer(&repo, attempt_id, q2, "atp");

    let provider = ScriptedProvider::new(Vec::new());
    let repository: Arc<dyn ExamRepository> = repo.clone();
    let pipeline = ResultProcessingPipeline::new(agent(provider.clone()), repository.clone()).unwrap();

    let outcome = ResultProcessingJob::new(pipeline, repository)
        .run(attempt_id)
        .await
        .unwrap();

    let result = outcome.result();
    assert_eq!(result.final_score, 1);
    assert_eq!(result.status, ResultStatus::PendingProfessorReview);
    assert_eq!(result.violation_count, 0);
    assert!(!result.integrity_flag);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_session_start_admits_one() {
    let session = SessionControl::new(Arc::new(MemoryStore::new()));
    let attempt_id = Uuid::new_v4();
    let duration = Duration::from_secs(1800);

    let (a, b) = tokio::join!(
        session.begin_attempt(attempt_id, duration),
        session.begin_attempt(attempt_id, duration)
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(PipelineError::LockContention { .. }))));

    let remaining = session.remaining_time(attempt_id).await.unwrap().unwrap();
    assert!(remaining <= duration && remaining > Duration::from_secs(1790));
}
