//! Structured agent calls: prompt in, schema-validated value out.
//!
//! `StructuredAgent` is the single entry point pipelines use to talk to a
//! model. It owns the timeout and the (small, bounded) retry policy so that
//! pipeline nodes see exactly one of three outcomes: a validated value, a
//! schema failure, or an upstream failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::litellm::{GenerationRequest, LlmProvider, Message};
use crate::error::AgentError;
use crate::metrics;
use crate::utils::{extract_json, JsonExtraction};

/// Upper bound on automatic retries at the agent boundary.
pub const MAX_AGENT_RETRIES: u32 = 2;

/// An expected output shape.
///
/// Deserialisation catches structural mismatches; `validate` adds the
/// field-level rules serde cannot express.
pub trait OutputShape: DeserializeOwned + Send {
    /// Name used in error messages.
    const SHAPE: &'static str;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Tunables for structured agent calls.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier; empty uses the provider default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Timeout for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after an upstream failure (clamped to `MAX_AGENT_RETRIES`).
    pub max_retries: u32,
    /// Response token budget.
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            timeout: Duration::from_secs(45),
            max_retries: MAX_AGENT_RETRIES,
            max_tokens: 4096,
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a component of an automated exam platform. \
Respond with a single JSON value that matches the requested structure. \
Do not add commentary before or after the JSON.";

/// Client used by every pipeline node that needs a model.
///
/// Constructed once at startup and shared (cheap to clone).
#[derive(Clone)]
pub struct StructuredAgent {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
}

impl std::fmt::Debug for StructuredAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StructuredAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        Self { provider, config }
    }

    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, AgentConfig::default())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Sends `prompt` and parses the reply into `T`.
    ///
    /// Upstream failures and timeouts are retried up to `max_retries` times.
    /// Schema failures are returned immediately.
    pub async fn call<T: OutputShape>(&self, agent: &str, prompt: &str) -> Result<T, AgentError> {
        let attempts = self.config.max_retries.min(MAX_AGENT_RETRIES) + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let started = Instant::now();
            match self.call_once::<T>(agent, prompt).await {
                Ok(value) => {
                    debug!(
                        agent,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Agent call succeeded"
                    );
                    metrics::record_agent_call(agent, "success");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(agent, attempt, error = %err, "Agent call failed, retrying");
                    metrics::record_agent_call(agent, "retry");
                    last_error = Some(err);
                }
                Err(err) => {
                    metrics::record_agent_call(agent, "failure");
                    return Err(err);
                }
            }
        }

        // Only reachable if every attempt was retryable and the loop ran out.
        Err(last_error.unwrap_or_else(|| AgentError::Upstream {
            agent: agent.to_string(),
            reason: "no attempts made".to_string(),
        }))
    }

    async fn call_once<T: OutputShape>(&self, agent: &str, prompt: &str) -> Result<T, AgentError> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = tokio::time::timeout(self.config.timeout, self.provider.generate(request))
            .await
            .map_err(|_| AgentError::Timeout {
                agent: agent.to_string(),
                seconds: self.config.timeout.as_secs(),
            })?
            .map_err(|e| AgentError::Upstream {
                agent: agent.to_string(),
                reason: e.to_string(),
            })?;

        let content = response.first_content().unwrap_or_default();
        parse_shape::<T>(agent, content)
    }
}

/// Parses a raw model reply into `T`, applying the shape's own validation.
pub fn parse_shape<T: OutputShape>(agent: &str, content: &str) -> Result<T, AgentError> {
    let schema_error = |reason: String| AgentError::SchemaValidation {
        agent: agent.to_string(),
        reason: format!("{}: {}", T::SHAPE, reason),
    };

    let json = match extract_json(content) {
        JsonExtraction::Found(json) => json,
        JsonExtraction::Truncated { open_scopes, .. } => {
            warn!(agent, open_scopes, "JSON appears truncated in LLM response");
            return Err(schema_error(format!(
                "response truncated with {} unclosed scopes",
                open_scopes
            )));
        }
        JsonExtraction::NotFound => {
            let preview: String = content.trim().chars().take(100).collect();
            return Err(schema_error(format!(
                "no JSON found, response starts with '{}'",
                preview
            )));
        }
    };

    let value: T = serde_json::from_str(&json).map_err(|e| schema_error(e.to_string()))?;
    value.validate().map_err(schema_error)?;
    Ok(value)
}
