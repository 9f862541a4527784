//! Backend Selection
//!
//! Enum for selecting between LLM providers (DeepSeek, Anthropic, OpenAI).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// LLM backend provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackend {
    /// DeepSeek reasoner via its OpenAI-compatible endpoint (default)
    #[default]
    DeepSeek,
    /// Anthropic Claude
    Anthropic,
    /// OpenAI GPT
    OpenAi,
}

impl AgentBackend {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            AgentBackend::DeepSeek => "DeepSeek",
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            AgentBackend::DeepSeek => "DEEPSEEK_API_KEY",
            AgentBackend::Anthropic => "ANTHROPIC_API_KEY",
            AgentBackend::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Environment variable overriding the model name
    pub fn model_var(&self) -> &'static str {
        match self {
            AgentBackend::DeepSeek => "DEEPSEEK_MODEL",
            AgentBackend::Anthropic => "ANTHROPIC_MODEL",
            AgentBackend::OpenAi => "OPENAI_MODEL",
        }
    }
}

/// Error type for parsing AgentBackend
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ParseBackendError(String);

impl FromStr for AgentBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(AgentBackend::DeepSeek),
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            other => Err(ParseBackendError(format!(
                "Unknown AGENT_BACKEND '{}'. Valid values: deepseek, anthropic, claude, openai, gpt",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
