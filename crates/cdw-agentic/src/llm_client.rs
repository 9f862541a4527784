//! LLM Client Trait
//!
//! Unified interface for LLM providers (Anthropic, OpenAI, DeepSeek).

use anyhow::Result;
use async_trait::async_trait;

use crate::conversation::ChatMessage;

/// Response from a single completion call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmReply {
    /// The assistant text
    pub content: String,
    /// Reasoning trace, when the provider returns one separately
    pub reasoning: Option<String>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
        }
    }
}

/// Unified LLM client interface
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the full ordered history and return one response.
    ///
    /// The call is a single blocking request from the caller's point of view:
    /// no streaming, no partial results.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmReply>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}
