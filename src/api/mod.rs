//! HTTP API surface: router composition, shared state, and the
//! request-id/error-envelope middleware, grounded on the teacher's `api.rs`.

pub mod chat;
pub mod error;
pub mod ingest;
pub mod search;
pub mod ws;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chat::ChatMemory;
use crate::config::AppConfig;
use crate::pipeline::IngestionPipeline;
use crate::rag::RagAnswerer;
use crate::retrieval::RetrievalEngine;

/// Shared application state, handed to every handler via `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub pipeline: Arc<IngestionPipeline>,
    pub retrieval: Arc<RetrievalEngine>,
    pub rag: Arc<RagAnswerer>,
    pub chat: Arc<ChatMemory>,
    pub config: Arc<AppConfig>,
}

/// Per-request id, threaded through extensions so handlers can stamp it
/// onto both the success path (not needed) and the error envelope.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Assigns a request id (reusing an inbound `X-Request-ID` header if the
/// caller supplied one) and echoes it back on every response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(RequestId(id));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/documents/{id}/ingest", post(ingest::ingest_handler))
        .route("/search", post(search::search_handler))
        .route("/chat/sessions", post(chat::create_session_handler))
        .route(
            "/chat/sessions/{id}/messages",
            get(chat::get_messages_handler),
        )
        .route("/chat/ask", post(chat::ask_handler))
        .route("/chat/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
