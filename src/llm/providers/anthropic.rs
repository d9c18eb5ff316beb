//! Anthropic Claude provider. Anthropic's message format differs from
//! OpenAI's, so this implements `LlmProvider` directly rather than
//! through the OpenAI-compatible base. Anthropic has no native embeddings
//! and no streaming support in this crate (spec scopes streaming to
//! OpenAI only), so both fall back accordingly.

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::llm::provider::{LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::HttpProviderClient;
use crate::llm::{EmbeddingResponse, GenerationResponse, GenerationStream, Message, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
                Role::System => "user".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

pub struct AnthropicProvider {
    client: HttpProviderClient,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn create(config: ProviderConfig) -> Arc<dyn LlmProvider> {
        let client = HttpProviderClient::new(config.timeout);
        Arc::new(Self { client, config })
    }

    pub fn from_config(api_key: String, text_model: String) -> Arc<dyn LlmProvider> {
        let config = ProviderConfig {
            provider: ProviderType::Anthropic,
            name: "anthropic".to_string(),
            api_key: Some(api_key),
            base_url: Some("https://api.anthropic.com".to_string()),
            text_model,
            embedding_model: None,
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 120,
        };
        Self::create(config)
    }

    fn base_url(&self) -> String {
        self.config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string())
    }

    fn build_headers(&self) -> Vec<(&str, String)> {
        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("anthropic-version", "2023-06-01".to_string()),
        ];
        if let Some(api_key) = &self.config.api_key {
            headers.push(("x-api-key", api_key.clone()));
        }
        headers
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse> {
        debug!("generating with Anthropic using {} messages", messages.len());

        let system_message = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());

        let anthropic_messages: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(AnthropicMessage::from)
            .collect();

        if anthropic_messages.is_empty() {
            return Err(AppError::BadRequest("no messages to send".to_string()));
        }

        let request = AnthropicRequest {
            model: self.config.text_model.clone(),
            messages: anthropic_messages,
            max_tokens: self.config.max_tokens,
            system: system_message,
            temperature: Some(self.config.temperature),
        };

        let url = format!("{}/v1/messages", self.base_url().trim_end_matches('/'));
        let headers = self.build_headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response: AnthropicResponse = self.client.post_json(&url, &request, borrowed).await?;

        if response.content.is_empty() {
            return Err(AppError::UpstreamError("no content in response".to_string()));
        }

        let text = response
            .content
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let total_tokens = response.usage.input_tokens + response.usage.output_tokens;

        info!("generated {} tokens with {}", total_tokens, response.model);

        Ok(GenerationResponse {
            text,
            tokens_used: Some(total_tokens),
            model: response.model,
            finish_reason: response.stop_reason,
        })
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<GenerationStream> {
        let response = self.generate(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(response.text) })))
    }

    async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
        Err(AppError::DependencyMissing(
            "Anthropic does not provide native embeddings; use a dedicated embedding provider"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_system_role_to_user_since_anthropic_handles_system_separately() {
        let msg = Message {
            role: Role::System,
            content: "be terse".to_string(),
        };
        let mapped = AnthropicMessage::from(&msg);
        assert_eq!(mapped.role, "user");
    }
}
