//! Core data model: documents, chunks, and chat state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a `Document` as it moves through the ingestion
/// pipeline (`pipeline.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Current processing step, surfaced alongside `processing_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStep {
    Upload,
    Extract,
    Chunk,
    EmbedStore,
    Completed,
    Error,
}

impl ProcessingStep {
    /// Progress percentage associated with reaching this step, matching
    /// the original pipeline's `STEP_PROGRESS` table.
    pub fn progress_percent(self) -> i32 {
        match self {
            ProcessingStep::Upload => 5,
            ProcessingStep::Extract => 35,
            ProcessingStep::Chunk => 70,
            ProcessingStep::EmbedStore => 100,
            ProcessingStep::Completed => 100,
            ProcessingStep::Error => 0,
        }
    }
}

/// A document registered for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_path: String,
    pub file_size: i64,
    pub text_content: Option<String>,
    pub status: DocumentStatus,
    pub processing_step: ProcessingStep,
    pub processing_progress: i32,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub processing_duration_ms: Option<i64>,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chunk of extracted document text, one unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub char_start: i32,
    pub char_end: i32,
    pub page: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// The logical id used as the Qdrant payload's `logical_id` field,
    /// stable across re-ingestion so stale vectors can be targeted for
    /// deletion by id.
    pub fn logical_id(&self) -> String {
        format!("{}_{}", self.document_id, self.chunk_index)
    }
}

/// Role of a message within a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A conversation between a user and the RAG answerer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub session_key: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A single turn in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
