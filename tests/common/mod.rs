//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_forge::llm::{
    AgentConfig, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    StructuredAgent, Usage,
};
use quiz_forge::LlmError;

/// Provider that answers from a fixed script and counts calls.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        *self.calls.lock().unwrap() += 1;
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("no scripted reply left".to_string()))?;

        Ok(GenerationResponse {
            id: "scripted".to_string(),
            model: "scripted".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(reply),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

pub fn agent(provider: Arc<ScriptedProvider>) -> StructuredAgent {
    let config = AgentConfig {
        max_retries: 0,
        ..AgentConfig::default()
    };
    StructuredAgent::new(provider, config)
}

pub const PHOTOSYNTHESIS: &str = "Photosynthesis is the process by which green plants use \
sunlight, water and carbon dioxide to produce glucose and oxygen. It takes place in the \
chloroplasts, where chlorophyll absorbs light. The light-dependent reactions produce ATP \
and NADPH, which the Calvin cycle uses to fix carbon.";

pub fn summary_reply() -> String {
    serde_json::json!({
        "summary": "Photosynthesis turns light, water and carbon dioxide into glucose and oxygen.",
        "key_topics": ["chlorophyll", "light reactions", "Calvin cycle"],
        "difficulty_level": "medium"
    })
    .to_string()
}

pub fn enhance_reply() -> String {
    serde_json::json!({
        "enhanced_prompt": "Write 5 medium multiple choice questions on photosynthesis."
    })
    .to_string()
}

/// Five mcq questions; `answered` of them carry a correct answer.
pub fn questions_reply(answered: usize) -> String {
    let questions: Vec<serde_json::Value> = (0..5)
        .map(|i| {
            let mut q = serde_json::json!({
                "question_text": format!("Photosynthesis question {}?", i + 1),
                "question_type": "mcq",
                "options": ["Chlorophyll", "Glucose", "Oxygen", "Water"],
                "marks": 1
            });
            if i < answered {
                q["correct_answer"] = serde_json::json!("Chlorophyll");
            }
            q
        })
        .collect();
    serde_json::json!({ "questions": questions }).to_string()
}
