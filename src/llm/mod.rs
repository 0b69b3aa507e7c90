//! Generative agent interface.
//!
//! Two layers:
//! - `LlmProvider` / `LiteLlmClient`: raw chat completion over HTTP.
//! - `StructuredAgent`: prompt in, schema-validated value out, with a
//!   per-call timeout and a small bounded retry budget.
//!
//! ```ignore
//! use quiz_forge::llm::{AgentConfig, LiteLlmClient, StructuredAgent};
//! use std::sync::Arc;
//!
//! let client = LiteLlmClient::new(api_base, Some(api_key), model, timeout)?;
//! let agent = StructuredAgent::new(Arc::new(client), AgentConfig::default());
//! let summary: DocumentSummary = agent.call("summarize", &prompt).await?;
//! ```

pub mod litellm;
pub mod structured;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
pub use structured::{parse_shape, AgentConfig, OutputShape, StructuredAgent, MAX_AGENT_RETRIES};
