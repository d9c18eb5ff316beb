//! End-to-end tests for the request-id / error-envelope contract on the
//! Axum router. These exercise routes whose validation failures return
//! before touching Postgres, Redis, or Qdrant, so a lazily-connected pool
//! (never actually dialed) and empty collaborators are enough.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use rag_service::api::{create_router, AppState};
use rag_service::chat::ChatMemory;
use rag_service::config::AppConfig;
use rag_service::embedding::client::EmbeddingClient;
use rag_service::error::{AppError, Result as AppResult};
use rag_service::llm::provider::{LlmProvider, ProviderType};
use rag_service::llm::{EmbeddingResponse, GenerationResponse, GenerationStream, Message};
use rag_service::pipeline::IngestionPipeline;
use rag_service::rag::RagAnswerer;
use rag_service::retrieval::RetrievalEngine;
use rag_service::retry::RetryPolicy;
use rag_service::vectorstore::{SearchFilter, VectorHit, VectorStore};

struct UnreachableProvider;

#[async_trait]
impl LlmProvider for UnreachableProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }
    fn name(&self) -> &str {
        "unreachable"
    }
    async fn generate(&self, _messages: &[Message]) -> AppResult<GenerationResponse> {
        Err(AppError::UpstreamError("not reachable in tests".to_string()))
    }
    async fn generate_stream(&self, _messages: &[Message]) -> AppResult<GenerationStream> {
        Err(AppError::UpstreamError("not reachable in tests".to_string()))
    }
    async fn embed(&self, _text: &str) -> AppResult<EmbeddingResponse> {
        Err(AppError::UpstreamError("not reachable in tests".to_string()))
    }
}

struct EmptyVectorStore;

#[async_trait]
impl VectorStore for EmptyVectorStore {
    async fn ensure_collection(&self, _vector_size: u64) -> AppResult<()> {
        Ok(())
    }
    async fn upsert(
        &self,
        _logical_ids: &[String],
        _vectors: &[Vec<f32>],
        _payloads: &[HashMap<String, Value>],
    ) -> AppResult<()> {
        Ok(())
    }
    async fn search(
        &self,
        _query_vector: &[f32],
        _limit: u64,
        _filter: &SearchFilter,
        _score_threshold: Option<f32>,
        _with_vectors: bool,
    ) -> AppResult<Vec<VectorHit>> {
        Ok(Vec::new())
    }
    async fn delete_by_logical_ids(&self, _logical_ids: &[String]) -> AppResult<()> {
        Ok(())
    }
    async fn delete_by_document_id(&self, _document_id: &str) -> AppResult<()> {
        Ok(())
    }
}

fn test_state() -> AppState {
    let pool = PgPoolOptions::new().connect_lazy("postgres://unused/unused").unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(EmptyVectorStore);
    let embedder = Arc::new(EmbeddingClient::new(
        Arc::new(UnreachableProvider),
        None,
        "fake-embed".to_string(),
        RetryPolicy::default(),
    ));
    let pipeline = Arc::new(IngestionPipeline::new(pool.clone(), store.clone(), embedder.clone()));
    let retrieval = Arc::new(RetrievalEngine::new(store, embedder));
    let rag = Arc::new(RagAnswerer::new(HashMap::new()));
    let chat = Arc::new(ChatMemory::new(pool.clone()));

    let config = AppConfig {
        database_url: "postgres://unused/unused".to_string(),
        redis_url: "redis://unused".to_string(),
        qdrant_url: "http://unused".to_string(),
        qdrant_collection: "documents".to_string(),
        embedding_dim: 2,
        embedding_model: "fake-embed".to_string(),
        llm_model: "gpt-4o-mini".to_string(),
        openai_api_key: None,
        anthropic_api_key: None,
        gemini_api_key: None,
        retry: RetryPolicy::default(),
        access_token_expire_minutes: 60,
        max_upload_size_bytes: 1024,
    };

    AppState {
        pool,
        pipeline,
        retrieval,
        rag,
        chat,
        config: Arc::new(config),
    }
}

#[tokio::test]
async fn empty_question_returns_validation_error_with_matching_request_id() {
    let router = create_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/chat/ask")
        .header("content-type", "application/json")
        .header("x-request-id", "11111111-1111-1111-1111-111111111111")
        .body(Body::from(r#"{"question": "   "}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let header_request_id = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(header_request_id, "11111111-1111-1111-1111-111111111111");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["request_id"], header_request_id);
    assert_eq!(body["error"]["details"][0]["loc"][0], "question");
}

#[tokio::test]
async fn search_with_invalid_top_k_is_rejected_before_touching_collaborators() {
    let router = create_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/search")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query": "hello", "top_k": 0}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"][0]["loc"][0], "top_k");
}

#[tokio::test]
async fn request_id_is_generated_when_caller_omits_header() {
    let router = create_router(test_state());

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let generated = response.headers().get("x-request-id").unwrap();
    assert!(uuid::Uuid::parse_str(generated.to_str().unwrap()).is_ok());
}
