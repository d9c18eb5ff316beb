//! LLM provider trait and common types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{EmbeddingResponse, GenerationResponse, GenerationStream, Message};

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Google,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::Google => write!(f, "google"),
        }
    }
}

/// Configuration for a specific LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub text_model: String,
    pub embedding_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    60
}

/// Trait all LLM providers implement. Embedding and streaming are optional
/// per-provider: only OpenAI in this crate supports both natively.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    fn name(&self) -> &str;

    /// Generate text from a conversation, returning the full response.
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse>;

    /// Generate text as a stream of text deltas. Providers without native
    /// streaming support fall back to one non-streaming call and yield a
    /// single chunk.
    async fn generate_stream(&self, messages: &[Message]) -> Result<GenerationStream>;

    /// Generate an embedding for `text`.
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;

    /// Embed a batch of texts in a single upstream request, aligned
    /// position-for-position with `texts`. Providers that only expose a
    /// single-text embedding endpoint can fall back to this default,
    /// which issues one request per text; providers with a native batch
    /// endpoint (OpenAI) override it to make exactly one request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResponse>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
