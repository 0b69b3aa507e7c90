//! Application configuration.
//!
//! Everything is read from environment variables with defaults, then
//! validated. The agent client, stores and repositories are built from one
//! `AppConfig` at startup and passed down explicitly.

use std::time::Duration;

use thiserror::Error;

use crate::llm::{AgentConfig, MAX_AGENT_RETRIES};
use crate::workflow::DEFAULT_STEP_LIMIT;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the exam platform core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Storage
    /// PostgreSQL connection URL. Only database-backed commands need it.
    pub database_url: Option<String>,
    /// Redis connection URL for the coordination store.
    pub redis_url: String,

    // Agent
    /// OpenAI-compatible API base URL.
    pub llm_api_base: String,
    /// Bearer key for the model provider.
    pub llm_api_key: Option<String>,
    /// Model used by every agent.
    pub llm_model: String,
    pub llm_temperature: f64,
    /// Timeout for a single agent attempt.
    pub agent_timeout: Duration,
    /// Extra attempts after an upstream failure.
    pub agent_max_retries: u32,

    // Session
    pub session_lock_ttl: Duration,
    pub heartbeat_ttl: Duration,
    /// Default exam length for `session start`.
    pub exam_duration: Duration,

    // Workflow
    pub workflow_step_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: "redis://127.0.0.1:6379".to_string(),

            llm_api_base: "https://openrouter.ai/api/v1".to_string(),
            llm_api_key: None,
            llm_model: "meta-llama/llama-3.3-70b-instruct".to_string(),
            llm_temperature: 0.7,
            agent_timeout: Duration::from_secs(45),
            agent_max_retries: MAX_AGENT_RETRIES,

            session_lock_ttl: Duration::from_secs(7200),
            heartbeat_ttl: Duration::from_secs(60),
            exam_duration: Duration::from_secs(3600),

            workflow_step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection URL (optional)
    /// - `REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    /// - `LLM_API_BASE`: API base URL (default: https://openrouter.ai/api/v1)
    /// - `LLM_API_KEY`: API key (optional)
    /// - `LLM_MODEL`: Model id (default: meta-llama/llama-3.3-70b-instruct)
    /// - `LLM_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `AGENT_TIMEOUT_SECS`: Per-attempt agent timeout (default: 45)
    /// - `AGENT_MAX_RETRIES`: Retries on upstream failure, at most 2 (default: 2)
    /// - `SESSION_LOCK_TTL_SECS`: Session lock lifetime (default: 7200)
    /// - `HEARTBEAT_TTL_SECS`: Heartbeat lifetime (default: 60)
    /// - `EXAM_DURATION_SECS`: Default exam length (default: 3600)
    /// - `WORKFLOW_STEP_LIMIT`: Max node executions per run (default: 25)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.database_url = var("DATABASE_URL");
        if let Some(val) = var("REDIS_URL") {
            config.redis_url = val;
        }

        if let Some(val) = var("LLM_API_BASE") {
            config.llm_api_base = val;
        }
        config.llm_api_key = var("LLM_API_KEY");
        if let Some(val) = var("LLM_MODEL") {
            config.llm_model = val;
        }
        if let Some(val) = var("LLM_TEMPERATURE") {
            config.llm_temperature = parse_env_value(&val, "LLM_TEMPERATURE")?;
        }
        if let Some(val) = var("AGENT_TIMEOUT_SECS") {
            config.agent_timeout = Duration::from_secs(parse_env_value(&val, "AGENT_TIMEOUT_SECS")?);
        }
        if let Some(val) = var("AGENT_MAX_RETRIES") {
            config.agent_max_retries = parse_env_value(&val, "AGENT_MAX_RETRIES")?;
        }

        if let Some(val) = var("SESSION_LOCK_TTL_SECS") {
            config.session_lock_ttl =
                Duration::from_secs(parse_env_value(&val, "SESSION_LOCK_TTL_SECS")?);
        }
        if let Some(val) = var("HEARTBEAT_TTL_SECS") {
            config.heartbeat_ttl = Duration::from_secs(parse_env_value(&val, "HEARTBEAT_TTL_SECS")?);
        }
        if let Some(val) = var("EXAM_DURATION_SECS") {
            config.exam_duration = Duration::from_secs(parse_env_value(&val, "EXAM_DURATION_SECS")?);
        }

        if let Some(val) = var("WORKFLOW_STEP_LIMIT") {
            config.workflow_step_limit = parse_env_value(&val, "WORKFLOW_STEP_LIMIT")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.llm_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::ValidationFailed(
                "llm_temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.agent_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "agent_timeout must be greater than 0".to_string(),
            ));
        }

        if self.agent_max_retries > MAX_AGENT_RETRIES {
            return Err(ConfigError::ValidationFailed(format!(
                "agent_max_retries cannot exceed {}",
                MAX_AGENT_RETRIES
            )));
        }

        if self.session_lock_ttl.as_secs() == 0 || self.heartbeat_ttl.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "session TTLs must be at least one second".to_string(),
            ));
        }

        if self.exam_duration.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "exam_duration must be at least one second".to_string(),
            ));
        }

        if self.workflow_step_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "workflow_step_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the database URL or a `MissingEnvVar` error.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    /// Agent tunables derived from this configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            timeout: self.agent_timeout,
            max_retries: self.agent_max_retries,
            ..AgentConfig::default()
        }
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    /// Builder method to set the agent timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Builder method to set the exam duration.
    pub fn with_exam_duration(mut self, duration: Duration) -> Self {
        self.exam_duration = duration;
        self
    }
}

/// Parses an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
