//! Multi-provider LLM dispatch: chat messages, provider trait, and the
//! concrete OpenAI/Anthropic/Gemini adapters.

pub mod provider;
pub mod providers;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Response from a non-streaming text generation call.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Response from an embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
}

/// A stream of text deltas from a streaming generation call.
pub type GenerationStream = BoxStream<'static, Result<String>>;

pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::Assistant,
        content: content.into(),
    }
}
