//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{
    AgentConfig, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    StructuredAgent, Usage,
};

/// Replies with canned responses in order and records every prompt.
///
/// Once the script runs out, calls fail with a transport error.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> Option<String> {
        self.prompts.lock().unwrap().get(index).cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))?;

        Ok(GenerationResponse {
            id: "mock".to_string(),
            model: "mock-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(reply),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

/// Agent over a scripted provider with retries disabled.
pub fn scripted_agent(provider: Arc<ScriptedProvider>) -> StructuredAgent {
    let config = AgentConfig {
        max_retries: 0,
        ..AgentConfig::default()
    };
    StructuredAgent::new(provider, config)
}
