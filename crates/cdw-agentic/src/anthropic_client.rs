//! Anthropic Client
//!
//! LLM client implementation for Anthropic Claude API.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::conversation::{ChatMessage, Role};
use super::llm_client::{LlmClient, LlmReply};

/// Default Anthropic model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic Claude API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    /// Create a new Anthropic client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model,
        }
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Bound every request by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Split the history into the top-level system prompt and an alternating
    /// user/assistant message list.
    fn split_messages(messages: &[ChatMessage]) -> (String, Vec<serde_json::Value>) {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // The messages API rejects two consecutive turns from the same role
        let mut turns: Vec<(Role, String)> = Vec::new();
        for message in messages.iter().filter(|m| m.role != Role::System) {
            match turns.last_mut() {
                Some((role, content)) if *role == message.role => {
                    content.push_str("\n\n");
                    content.push_str(&message.content);
                }
                _ => turns.push((message.role, message.content.clone())),
            }
        }

        let turns = turns
            .into_iter()
            .map(|(role, content)| serde_json::json!({"role": role.as_str(), "content": content}))
            .collect();
        (system, turns)
    }

    /// Internal API call implementation
    async fn call_api(&self, messages: &[ChatMessage]) -> Result<LlmReply> {
        let (system, turns) = Self::split_messages(messages);
        if turns.is_empty() {
            return Err(anyhow!("Anthropic request needs at least one user turn"));
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 8192,
                "system": system,
                "messages": turns
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await?;
        let text: Vec<String> = api_response
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect();
        if text.is_empty() {
            return Err(anyhow!("Empty response from Anthropic"));
        }
        Ok(LlmReply::text(text.join("\n")))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmReply> {
        self.call_api(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;

    #[test]
    fn test_with_model() {
        let client = AnthropicClient::with_model("test-key".to_string(), "claude-3-opus");
        assert_eq!(client.model_name(), "claude-3-opus");
        assert_eq!(client.provider_name(), "Anthropic");
    }

    #[test]
    fn test_split_merges_consecutive_roles() {
        let mut conversation = Conversation::with_system("rules");
        conversation.push_user("record 0");
        conversation.push_assistant("sql 0");
        conversation.push_user("execution output");
        conversation.push_user("please fix");

        let (system, turns) = AnthropicClient::split_messages(conversation.messages());
        assert_eq!(system, "rules");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2]["role"], "user");
        assert_eq!(turns[2]["content"], "execution output\n\nplease fix");
    }

    #[test]
    fn test_split_joins_system_prompts() {
        let mut conversation = Conversation::with_system("first");
        conversation.push_system("second");
        conversation.push_user("go");

        let (system, turns) = AnthropicClient::split_messages(conversation.messages());
        assert_eq!(system, "first\n\nsecond");
        assert_eq!(turns.len(), 1);
    }
}
