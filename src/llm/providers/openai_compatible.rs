//! OpenAI-compatible chat/embeddings implementation, shared by any adapter
//! that speaks the OpenAI wire format.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::llm::provider::{LlmProvider, ProviderConfig, ProviderType};
use crate::llm::providers::base::{HttpProviderClient, OpenAICompatible};
use crate::llm::{EmbeddingResponse, GenerationResponse, GenerationStream, Message, Role};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: OpenAIMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsageInfo {
    pub total_tokens: u32,
}

/// One `data:` frame of an OpenAI chat-completion SSE stream.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

/// Batch form of [`EmbeddingRequest`]: OpenAI's `input` field accepts
/// either a single string or an array, so one request embeds many texts.
#[derive(Debug, Serialize)]
pub struct EmbeddingBatchRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponseData {
    pub data: Vec<EmbeddingData>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub index: usize,
}

/// Generic OpenAI-compatible provider, parameterized over the adapter
/// that supplies the base URL and auth scheme.
pub struct OpenAICompatibleProvider<T: OpenAICompatible + Send + Sync> {
    adapter: T,
    client: HttpProviderClient,
    config: ProviderConfig,
}

impl<T: OpenAICompatible + Send + Sync> OpenAICompatibleProvider<T> {
    pub fn new(adapter: T, config: ProviderConfig) -> Self {
        let client = HttpProviderClient::new(config.timeout);
        Self {
            adapter,
            client,
            config,
        }
    }

    fn build_headers(&self) -> Vec<(&str, String)> {
        let mut headers = self.adapter.auth_headers();
        headers.push(("Content-Type", "application/json".to_string()));
        headers
    }
}

#[async_trait]
impl<T: OpenAICompatible + Send + Sync + 'static> LlmProvider for OpenAICompatibleProvider<T> {
    fn provider_type(&self) -> ProviderType {
        self.config.provider
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse> {
        debug!("generating with {} using {} messages", self.name(), messages.len());

        let request = ChatCompletionRequest {
            model: self.config.text_model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: false,
        };

        let url = self.adapter.build_url("chat/completions");
        let headers = self.build_headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response: ChatCompletionResponse =
            self.client.post_json(&url, &request, borrowed).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UpstreamError("no choices in response".to_string()))?;

        info!(
            "generated {} tokens with {}",
            response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
            response.model
        );

        Ok(GenerationResponse {
            text: choice.message.content,
            tokens_used: response.usage.map(|u| u.total_tokens),
            model: response.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<GenerationStream> {
        let request = ChatCompletionRequest {
            model: self.config.text_model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: true,
        };

        let url = self.adapter.build_url("chat/completions");
        let headers = self.build_headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = self
            .client
            .post_json_streaming(&url, &request, borrowed)
            .await?;

        let byte_stream = response.bytes_stream();
        let text_stream = byte_stream.map(|chunk| {
            let bytes = chunk.map_err(AppError::from)?;
            let text = String::from_utf8_lossy(&bytes).to_string();
            let mut deltas = String::new();
            for line in text.lines() {
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) {
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            deltas.push_str(&content);
                        }
                    }
                }
            }
            Ok(deltas)
        });

        Ok(Box::pin(text_stream))
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let embedding_model = self
            .config
            .embedding_model
            .as_ref()
            .ok_or_else(|| AppError::DependencyMissing("no embedding model configured".to_string()))?;

        let request = EmbeddingRequest {
            model: embedding_model.clone(),
            input: text.to_string(),
        };

        let url = self.adapter.build_url("embeddings");
        let headers = self.build_headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response: EmbeddingResponseData =
            self.client.post_json(&url, &request, borrowed).await?;

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UpstreamError("no embeddings in response".to_string()))?;

        Ok(EmbeddingResponse {
            embedding: data.embedding,
            model: response.model,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResponse>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_model = self
            .config
            .embedding_model
            .as_ref()
            .ok_or_else(|| AppError::DependencyMissing("no embedding model configured".to_string()))?;

        let request = EmbeddingBatchRequest {
            model: embedding_model.clone(),
            input: texts.to_vec(),
        };

        let url = self.adapter.build_url("embeddings");
        let headers = self.build_headers();
        let borrowed: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response: EmbeddingResponseData =
            self.client.post_json(&url, &request, borrowed).await?;

        if response.data.len() != texts.len() {
            return Err(AppError::UpstreamError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API is documented to preserve input order, but `index` is
        // authoritative when present so a reordered response still lines
        // up with `texts`.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| EmbeddingResponse {
                embedding: d.embedding,
                model: response.model.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestAdapter {
        base_url: String,
        api_key: Option<String>,
    }

    impl OpenAICompatible for TestAdapter {
        fn base_url(&self) -> &str {
            &self.base_url
        }
        fn api_key(&self) -> Option<&str> {
            self.api_key.as_deref()
        }
    }

    #[test]
    fn message_conversion_maps_roles() {
        let msg = Message {
            role: Role::User,
            content: "Hello".to_string(),
        };
        let openai_msg = OpenAIMessage::from(&msg);
        assert_eq!(openai_msg.role, "user");
        assert_eq!(openai_msg.content, "Hello");
    }

    #[test]
    fn provider_construction() {
        let adapter = TestAdapter {
            base_url: "https://api.example.com/v1".to_string(),
            api_key: Some("test-key".to_string()),
        };
        let config = ProviderConfig {
            provider: ProviderType::OpenAI,
            name: "test".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some("https://api.example.com/v1".to_string()),
            text_model: "gpt-4o".to_string(),
            embedding_model: Some("text-embedding-3-small".to_string()),
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 60,
        };
        let _provider = OpenAICompatibleProvider::new(adapter, config);
    }
}
