//! Google Gemini provider. Like Anthropic, no streaming support in this
//! crate; `generate_stream` falls back to one non-streaming call.

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
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

impl From<&Message> for GeminiContent {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::User => "user".to_string(),
                Role::Assistant => "model".to_string(),
                Role::System => "user".to_string(),
            },
            parts: vec![GeminiPart {
                text: msg.content.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: GeminiContent,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsageMetadata {
    pub total_token_count: u32,
}

#[derive(Debug, Serialize)]
pub struct GeminiEmbedRequest {
    pub content: GeminiContent,
}

#[derive(Debug, Deserialize)]
pub struct GeminiEmbedResponse {
    pub embedding: EmbeddingData,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub values: Vec<f32>,
}

pub struct GoogleProvider {
    client: HttpProviderClient,
    config: ProviderConfig,
}

impl GoogleProvider {
    pub fn create(config: ProviderConfig) -> Arc<dyn LlmProvider> {
        let client = HttpProviderClient::new(config.timeout);
        Arc::new(Self { client, config })
    }

    pub fn from_config(api_key: String, text_model: String, embedding_model: String) -> Arc<dyn LlmProvider> {
        let config = ProviderConfig {
            provider: ProviderType::Google,
            name: "google".to_string(),
            api_key: Some(api_key),
            base_url: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
            text_model,
            embedding_model: Some(embedding_model),
            max_tokens: 2048,
            temperature: 0.7,
            timeout: 120,
        };
        Self::create(config)
    }

    fn base_url(&self) -> String {
        self.config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string())
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Google
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse> {
        debug!("generating with Google Gemini using {} messages", messages.len());

        let contents: Vec<GeminiContent> = messages.iter().map(GeminiContent::from).collect();
        if contents.is_empty() {
            return Err(AppError::BadRequest("no messages to send".to_string()));
        }

        let request = GeminiRequest {
            contents,
            generation_config: Some(GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            }),
        };

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AppError::Unauthorized)?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url().trim_end_matches('/'),
            self.config.text_model,
            api_key
        );
        let headers = vec![("Content-Type", "application/json")];

        let response: GeminiResponse = self.client.post_json(&url, &request, headers).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UpstreamError("no candidates in response".to_string()))?;

        let text = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let tokens_used = response.usage_metadata.map(|u| u.total_token_count);
        info!("generated {} tokens with {}", tokens_used.unwrap_or(0), self.config.text_model);

        Ok(GenerationResponse {
            text,
            tokens_used,
            model: self.config.text_model.clone(),
            finish_reason: candidate.finish_reason,
        })
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<GenerationStream> {
        let response = self.generate(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(response.text) })))
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let embedding_model = self
            .config
            .embedding_model
            .as_ref()
            .ok_or_else(|| AppError::DependencyMissing("no embedding model configured".to_string()))?;

        let request = GeminiEmbedRequest {
            content: GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        };

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AppError::Unauthorized)?;

        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url().trim_end_matches('/'),
            embedding_model,
            api_key
        );
        let headers = vec![("Content-Type", "application/json")];

        let response: GeminiEmbedResponse = self.client.post_json(&url, &request, headers).await?;

        Ok(EmbeddingResponse {
            embedding: response.embedding.values,
            model: embedding_model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_assistant_role_to_model() {
        let msg = Message {
            role: Role::Assistant,
            content: "hi".to_string(),
        };
        let content = GeminiContent::from(&msg);
        assert_eq!(content.role, "model");
    }
}
