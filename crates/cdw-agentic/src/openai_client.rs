//! OpenAI Client
//!
//! LLM client for the OpenAI chat-completions wire format. DeepSeek exposes the
//! same API, so it is served by this client with a different base URL.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::conversation::ChatMessage;
use super::llm_client::{LlmClient, LlmReply};

/// Default OpenAI model
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEEPSEEK_MODEL: &str = "deepseek-reasoner";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// OpenAI-compatible API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    base_url: String,
    provider: &'static str,
    temperature: Option<f32>,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: "OpenAI",
            temperature: Some(0.1),
        }
    }

    /// Create a DeepSeek client (OpenAI-compatible endpoint)
    pub fn deepseek(api_key: String) -> Self {
        let model =
            std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| DEEPSEEK_MODEL.to_string());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model,
            base_url: DEEPSEEK_BASE_URL.to_string(),
            provider: "DeepSeek",
            // deepseek-reasoner ignores sampling parameters
            temperature: None,
        }
    }

    /// Create with a specific model
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point at a different OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Bound every request by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": &m.content}))
            .collect();

        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": messages,
            "stream": false
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    /// Internal API call implementation
    async fn call_api(&self, messages: &[ChatMessage]) -> Result<LlmReply> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(messages))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider, status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
            reasoning_content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        let message = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("{} returned no choices", self.provider))?;

        Ok(LlmReply {
            content: message.content.unwrap_or_default(),
            reasoning: message.reasoning_content,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmReply> {
        self.call_api(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        self.provider
    }
}
