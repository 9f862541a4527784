//! Client Factory
//!
//! Builds the configured `LlmClient` behind an `Arc<dyn LlmClient>`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::anthropic_client::AnthropicClient;
use crate::backend::AgentBackend;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Provider settings, usually read from the pipeline config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub backend: AgentBackend,
    /// Overrides the provider default and the `*_MODEL` env var
    pub model: Option<String>,
    /// Falls back to the provider's `*_API_KEY` env var
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Only meaningful for OpenAI-compatible backends
    pub base_url: Option<String>,
    /// Per-request timeout; unset means wait indefinitely
    pub timeout_secs: Option<u64>,
}

impl LlmSettings {
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let var = self.backend.api_key_var();
        std::env::var(var).map_err(|_| anyhow!("{} environment variable not set", var))
    }
}

/// Create a client from explicit settings
pub fn create_llm_client_with(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    let api_key = settings.resolve_api_key()?;
    let timeout = settings.timeout_secs.map(Duration::from_secs);
    let model = settings
        .model
        .clone()
        .or_else(|| std::env::var(settings.backend.model_var()).ok());

    let client: Arc<dyn LlmClient> = match settings.backend {
        AgentBackend::DeepSeek | AgentBackend::OpenAi => {
            let mut client = if settings.backend == AgentBackend::DeepSeek {
                OpenAiClient::deepseek(api_key)
            } else {
                OpenAiClient::new(api_key)
            };
            if let Some(model) = &model {
                client = client.with_model(model);
            }
            if let Some(base_url) = &settings.base_url {
                client = client.with_base_url(base_url);
            }
            if let Some(timeout) = timeout {
                client = client.with_timeout(timeout)?;
            }
            Arc::new(client)
        }
        AgentBackend::Anthropic => {
            let mut client = match &model {
                Some(model) => AnthropicClient::with_model(api_key, model),
                None => AnthropicClient::new(api_key),
            };
            if let Some(timeout) = timeout {
                client = client.with_timeout(timeout)?;
            }
            Arc::new(client)
        }
    };

    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "LLM client ready"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_and_model() {
        let settings = LlmSettings {
            backend: AgentBackend::Anthropic,
            model: Some("claude-3-opus".to_string()),
            api_key: Some("test-key".to_string()),
            ..LlmSettings::default()
        };
        let client = create_llm_client_with(&settings).unwrap();
        assert_eq!(client.provider_name(), "Anthropic");
        assert_eq!(client.model_name(), "claude-3-opus");
    }

    #[test]
    fn test_deepseek_with_timeout() {
        let settings = LlmSettings {
            backend: AgentBackend::DeepSeek,
            model: Some("deepseek-chat".to_string()),
            api_key: Some("test-key".to_string()),
            timeout_secs: Some(30),
            ..LlmSettings::default()
        };
        let client = create_llm_client_with(&settings).unwrap();
        assert_eq!(client.provider_name(), "DeepSeek");
        assert_eq!(client.model_name(), "deepseek-chat");
    }

    #[test]
    fn test_settings_from_yaml_like_json() {
        let settings: LlmSettings =
            serde_json::from_str(r#"{"backend": "openai", "timeout_secs": 5}"#).unwrap();
        assert_eq!(settings.backend, AgentBackend::OpenAi);
        assert_eq!(settings.timeout_secs, Some(5));
        assert!(settings.model.is_none());
    }
}
