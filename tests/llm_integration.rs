//! Integration tests against live services.
//!
//! These tests make real API calls and talk to a real Redis.
//! Run with: LLM_API_KEY=your_key REDIS_URL=redis://127.0.0.1:6379 cargo test --test llm_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use quiz_forge::config::AppConfig;
use quiz_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message, StructuredAgent};
use quiz_forge::quiz::{Blueprint, QuestionType, QuizCreationPipeline, QuizInput};
use quiz_forge::session::{RedisStore, SessionControl};
use quiz_forge::PipelineError;
use uuid::Uuid;

fn test_config() -> AppConfig {
    let config = AppConfig::from_env().expect("configuration should be valid");
    assert!(
        config.llm_api_key.is_some(),
        "LLM_API_KEY environment variable must be set for integration tests"
    );
    config
}

fn create_test_client(config: &AppConfig) -> LiteLlmClient {
    LiteLlmClient::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        Duration::from_secs(60),
    )
    .expect("client should build")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let config = test_config();
    let client = create_test_client(&config);

    let request = GenerationRequest::new(
        config.llm_model.clone(),
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(
        content.contains('4'),
        "Response should contain '4', got: {}",
        content
    );
}

#[tokio::test]
#[ignore]
async fn test_quiz_creation_against_live_model() {
    let config = test_config();
    let client = create_test_client(&config);
    let agent = StructuredAgent::new(Arc::new(client), config.agent_config());
    let pipeline = QuizCreationPipeline::new(agent).expect("graph should compile");

    let input = QuizInput {
        extracted_text: "Photosynthesis is the process by which green plants use sunlight, \
            water and carbon dioxide to produce glucose and oxygen. Chlorophyll in the \
            chloroplasts absorbs the light."
            .to_string(),
        blueprint: Blueprint {
            count: Some(3),
            types: vec![QuestionType::Mcq],
            ..Blueprint::default()
        },
        professor_note: None,
    };

    let output = pipeline.run(input).await.expect("pipeline should succeed");
    assert!(!output.questions.is_empty());
    assert!(output.questions.iter().all(|q| q.has_answer()));
    assert!(output.questions.iter().all(|q| q.marks > 0));
}

#[tokio::test]
#[ignore]
async fn test_redis_lock_is_exclusive() {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = RedisStore::connect(&redis_url)
        .await
        .expect("Redis should be reachable");
    let session = SessionControl::new(Arc::new(store)).with_lock_ttl(Duration::from_secs(30));
    let attempt_id = Uuid::new_v4();

    let (a, b) = tokio::join!(
        session.begin_attempt(attempt_id, Duration::from_secs(20)),
        session.begin_attempt(attempt_id, Duration::from_secs(20))
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(PipelineError::LockContention { .. }))));

    let remaining = session
        .remaining_time(attempt_id)
        .await
        .expect("ttl read")
        .expect("timer set");
    assert!(remaining <= Duration::from_secs(20));

    assert_eq!(session.record_violation(attempt_id, "tab_switch").await.unwrap(), 1);
    assert_eq!(session.record_violation(attempt_id, "tab_switch").await.unwrap(), 2);
    assert_eq!(session.violation_total(attempt_id).await.unwrap(), 2);
}
