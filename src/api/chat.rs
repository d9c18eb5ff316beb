//! `POST /chat/sessions`, `GET /chat/sessions/{id}/messages`, and
//! `POST /chat/ask` (stream and non-stream).

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::ApiError;
use super::search::SearchFiltersRequest;
use super::{AppState, RequestId};
use crate::chat::ChatMemory;
use crate::llm::{assistant_message, user_message, GenerationStream, Message};
use crate::models::{ChatMessage, MessageRole};
use crate::vectorstore::SearchFilter;

/// Wraps a [`GenerationStream`] so the user/assistant turn is persisted
/// once the stream is dropped, whether that's because the client drained
/// it to completion or disconnected early. Spawning the persist task up
/// front (before the body is ever polled) would race the accumulator
/// against the stream and always persist an empty answer.
struct PersistOnDrop {
    inner: GenerationStream,
    chat: Arc<ChatMemory>,
    session_id: Uuid,
    question: String,
    accumulated: Arc<Mutex<String>>,
}

impl Stream for PersistOnDrop {
    type Item = Result<axum::body::Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(text))) => {
                this.accumulated.lock().unwrap().push_str(&text);
                Poll::Ready(Some(Ok(axum::body::Bytes::from(text))))
            }
            Poll::Ready(Some(Err(e))) => {
                Poll::Ready(Some(Err(std::io::Error::other(e.to_string()))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PersistOnDrop {
    fn drop(&mut self) {
        let answer = self.accumulated.lock().unwrap().clone();
        if answer.is_empty() {
            return;
        }
        let chat = self.chat.clone();
        let session_id = self.session_id;
        let question = std::mem::take(&mut self.question);
        tokio::spawn(async move {
            if let Err(err) = chat.add_turn(session_id, &question, &answer).await {
                tracing::warn!(%err, "failed to persist streamed chat turn");
            }
        });
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub session_key: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Create a new chat session.
#[utoipa::path(
    post,
    path = "/chat/sessions",
    tag = "chat",
    request_body = CreateSessionRequest,
    responses((status = 200, description = "Session created", body = SessionResponse))
)]
pub async fn create_session_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let owner_id = request.owner_id.unwrap_or_else(Uuid::nil);
    let session = state
        .chat
        .create_session(owner_id)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;
    Ok(Json(SessionResponse {
        id: session.id,
        session_key: session.session_key,
        created_at: session.created_at,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

/// Fetch a session's message history in chronological order.
#[utoipa::path(
    get,
    path = "/chat/sessions/{id}/messages",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("limit" = Option<i64>, Query, description = "Max messages to return (1-200, default 50)")
    ),
    responses((status = 200, description = "Message history", body = [MessageResponse]))
)]
pub async fn get_messages_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    state
        .chat
        .get_session_by_id(session_id)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;
    let messages = state
        .chat
        .get_messages(session_id, limit)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub use_mmr: bool,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    pub model: Option<String>,
    pub filters: Option<SearchFiltersRequest>,
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_max_history")]
    pub max_history_messages: usize,
}

fn default_top_k() -> usize {
    5
}
fn default_mmr_lambda() -> f32 {
    0.5
}
fn default_max_context_chars() -> usize {
    crate::rag::DEFAULT_CONTEXT_CHAR_BUDGET
}
fn default_max_history() -> usize {
    10
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContextUsed {
    pub text: Option<String>,
    pub score: f32,
    pub metadata: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    pub answer: String,
    pub model: String,
    pub contexts: Vec<ContextUsed>,
    pub session_id: Uuid,
    pub session_key: Uuid,
}

async fn resolve_session(
    state: &AppState,
    session_key: Option<Uuid>,
    request_id: Uuid,
) -> Result<crate::models::ChatSession, ApiError> {
    match session_key {
        Some(key) => state
            .chat
            .get_session_by_key(key)
            .await
            .map_err(|e| ApiError::new(e, request_id)),
        None => state
            .chat
            .create_session(Uuid::nil())
            .await
            .map_err(|e| ApiError::new(e, request_id)),
    }
}

fn history_as_messages(messages: Vec<ChatMessage>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|m| match m.role {
            MessageRole::User => user_message(m.content),
            MessageRole::Assistant => assistant_message(m.content),
        })
        .collect()
}

/// Answer a question using retrieved context and chat history. When
/// `stream` is true the body is a `text/plain` stream of answer deltas
/// instead of the documented JSON shape.
#[utoipa::path(
    post,
    path = "/chat/ask",
    tag = "chat",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer (JSON, or a token stream when stream=true)", body = AskResponse),
        (status = 422, description = "Request validation failed")
    )
)]
pub async fn ask_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let mut errors = Vec::new();
    if request.question.trim().is_empty() {
        errors.push(super::error::field_error("question", "question must not be empty"));
    }
    if !(500..=20000).contains(&request.max_context_chars) {
        errors.push(super::error::field_error(
            "max_context_chars",
            "max_context_chars must be between 500 and 20000",
        ));
    }
    if !(0..=50).contains(&request.max_history_messages) {
        errors.push(super::error::field_error(
            "max_history_messages",
            "max_history_messages must be between 0 and 50",
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(request_id, "request validation failed", errors));
    }

    let session = resolve_session(&state, request.session_id, request_id).await?;

    let filter = request
        .filters
        .as_ref()
        .map(|f| SearchFilter {
            document_id: f.document_id.clone(),
            owner_id: f.owner_id.clone(),
            content_type: f.content_type.clone(),
            created_after_ts: f.created_from.map(|d| d.timestamp()),
            created_before_ts: f.created_to.map(|d| d.timestamp()),
        })
        .unwrap_or_default();

    let retrieval = state
        .retrieval
        .semantic_search(
            &request.question,
            request.top_k,
            None,
            &filter,
            request.score_threshold,
            request.use_mmr,
            request.mmr_lambda,
        )
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    let history = history_as_messages(
        state
            .chat
            .get_messages(session.id, request.max_history_messages as i64)
            .await
            .map_err(|e| ApiError::new(e, request_id))?,
    );

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.config.llm_model.clone());

    if request.stream {
        let stream = state
            .rag
            .answer_stream(
                &request.question,
                &model,
                &retrieval.hits,
                &history,
                request.max_context_chars,
            )
            .await
            .map_err(|e| ApiError::new(e, request_id))?;

        let body_stream = PersistOnDrop {
            inner: stream,
            chat: state.chat.clone(),
            session_id: session.id,
            question: request.question.clone(),
            accumulated: Arc::new(Mutex::new(String::new())),
        };

        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from_stream(body_stream))
            .expect("valid streaming response");

        return Ok(response);
    }

    let answer = state
        .rag
        .answer(
            &request.question,
            &model,
            &retrieval.hits,
            &history,
            request.max_context_chars,
        )
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    state
        .chat
        .add_turn(session.id, &request.question, &answer)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    let hits_used = crate::rag::contexts_within_budget(&retrieval.hits, request.max_context_chars);
    let contexts = hits_used
        .into_iter()
        .map(|h| ContextUsed {
            text: h.text.clone(),
            score: h.score,
            metadata: h.payload.clone(),
        })
        .collect();

    Ok(Json(AskResponse {
        answer,
        model,
        contexts,
        session_id: session.id,
        session_key: session.session_key,
    })
    .into_response())
}
