//! End-to-end tests for the ingestion pipeline against a real Postgres
//! database, with an in-memory fake standing in for the vector store and
//! embedding provider. Skips with a message if `DATABASE_URL` isn't set or
//! isn't reachable, the same way the teacher's Ollama-backed tests skip
//! when no local Ollama is running.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tempfile::NamedTempFile;
use uuid::Uuid;

use rag_service::embedding::client::EmbeddingClient;
use rag_service::error::Result as AppResult;
use rag_service::llm::provider::{LlmProvider, ProviderType};
use rag_service::llm::{EmbeddingResponse, GenerationResponse, GenerationStream, Message};
use rag_service::models::Document;
use rag_service::pipeline::IngestionPipeline;
use rag_service::retry::RetryPolicy;
use rag_service::vectorstore::{SearchFilter, VectorHit, VectorStore};

struct FakeEmbeddingProvider;

#[async_trait]
impl LlmProvider for FakeEmbeddingProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, _messages: &[Message]) -> AppResult<GenerationResponse> {
        unimplemented!("not exercised by ingestion tests")
    }

    async fn generate_stream(&self, _messages: &[Message]) -> AppResult<GenerationStream> {
        unimplemented!("not exercised by ingestion tests")
    }

    async fn embed(&self, text: &str) -> AppResult<EmbeddingResponse> {
        // Deterministic low-dimensional embedding so duplicate content
        // hashes to the same vector without needing a real model.
        let embedding = vec![text.len() as f32, text.chars().filter(|c| *c == ' ').count() as f32];
        Ok(EmbeddingResponse {
            embedding,
            model: "fake-embed".to_string(),
        })
    }
}

struct FaultyEmbeddingProvider;

#[async_trait]
impl LlmProvider for FaultyEmbeddingProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn name(&self) -> &str {
        "faulty"
    }

    async fn generate(&self, _messages: &[Message]) -> AppResult<GenerationResponse> {
        unimplemented!()
    }

    async fn generate_stream(&self, _messages: &[Message]) -> AppResult<GenerationStream> {
        unimplemented!()
    }

    async fn embed(&self, _text: &str) -> AppResult<EmbeddingResponse> {
        Err(rag_service::error::AppError::UpstreamError(
            "embedding backend down".to_string(),
        ))
    }
}

#[derive(Default)]
struct InMemoryVectorStore {
    points: Mutex<HashMap<String, VectorHit>>,
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, _vector_size: u64) -> AppResult<()> {
        Ok(())
    }

    async fn upsert(
        &self,
        logical_ids: &[String],
        vectors: &[Vec<f32>],
        payloads: &[HashMap<String, Value>],
    ) -> AppResult<()> {
        let mut points = self.points.lock().unwrap();
        for ((id, vector), payload) in logical_ids.iter().zip(vectors).zip(payloads) {
            points.insert(
                id.clone(),
                VectorHit {
                    logical_id: id.clone(),
                    score: 1.0,
                    vector: vector.clone(),
                    payload: payload.clone(),
                },
            );
        }
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
        Ok(self.points.lock().unwrap().values().cloned().collect())
    }

    async fn delete_by_logical_ids(&self, logical_ids: &[String]) -> AppResult<()> {
        let mut points = self.points.lock().unwrap();
        for id in logical_ids {
            points.remove(id);
        }
        Ok(())
    }

    async fn delete_by_document_id(&self, document_id: &str) -> AppResult<()> {
        let mut points = self.points.lock().unwrap();
        points.retain(|_, hit| {
            hit.payload.get("document_id").and_then(|v| v.as_str()) != Some(document_id)
        });
        Ok(())
    }
}

async fn try_connect() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    match PgPoolOptions::new().max_connections(2).connect(&url).await {
        Ok(pool) => {
            if sqlx::migrate!("./migrations").run(&pool).await.is_err() {
                return None;
            }
            Some(pool)
        }
        Err(_) => None,
    }
}

async fn insert_pending_document(pool: &sqlx::PgPool, content_type: &str, file_path: &str) -> Document {
    sqlx::query_as(
        "INSERT INTO documents (id, owner_id, name, original_filename, content_type, file_path, file_size, status, processing_step, processing_progress, error_count, is_deleted, created_at, updated_at)
         VALUES ($1, $2, $3, $3, $4, $5, 0, 'pending', 'upload', 0, 0, FALSE, now(), now())
         RETURNING id, owner_id, name, original_filename, content_type, file_path, file_size, text_content, status, processing_step, processing_progress, processing_started_at, processing_completed_at, processing_duration_ms, error_count, last_error, is_deleted, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind("test-doc.txt")
    .bind(content_type)
    .bind(file_path)
    .fetch_one(pool)
    .await
    .expect("insert pending document")
}

#[tokio::test]
async fn ingestion_produces_dense_chunk_index_and_one_vector_per_chunk() {
    let Some(pool) = try_connect().await else {
        eprintln!("skipping: DATABASE_URL not set or Postgres unreachable");
        return;
    };

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "Paragraph one has enough words to matter.\n\nParagraph two follows with more content to pad things out further.\n\nAnd a third paragraph, long enough that a small chunk size forces splitting across multiple chunks for this test."
    )
    .unwrap();
    let document = insert_pending_document(&pool, "text/plain", file.path().to_str().unwrap()).await;

    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::default());
    let embedder = Arc::new(EmbeddingClient::new(
        Arc::new(FakeEmbeddingProvider),
        None,
        "fake-embed".to_string(),
        RetryPolicy::default(),
    ));
    let pipeline = IngestionPipeline::new(pool.clone(), store.clone(), embedder);

    let result = pipeline.run(document.id, 80, 10).await.expect("ingestion succeeds");
    assert!(result.chunks_indexed > 1, "small chunk size should force multiple chunks");
    assert_eq!(result.steps.len(), 3);

    let chunks: Vec<(i32,)> = sqlx::query_as("SELECT chunk_index FROM chunks WHERE document_id = $1 ORDER BY chunk_index")
        .bind(document.id)
        .fetch_all(&pool)
        .await
        .unwrap();
    let indices: Vec<i32> = chunks.into_iter().map(|(i,)| i).collect();
    let expected: Vec<i32> = (0..indices.len() as i32).collect();
    assert_eq!(indices, expected, "chunk_index must be dense starting at 0");

    let final_doc: (String, Option<String>) =
        sqlx::query_as("SELECT status, text_content FROM documents WHERE id = $1")
            .bind(document.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(final_doc.0, "completed");
    assert!(final_doc.1.is_some(), "completed documents must have text_content set");

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document.id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn embedding_failure_rolls_back_chunks_and_marks_document_errored() {
    let Some(pool) = try_connect().await else {
        eprintln!("skipping: DATABASE_URL not set or Postgres unreachable");
        return;
    };

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "short document body").unwrap();
    let document = insert_pending_document(&pool, "text/plain", file.path().to_str().unwrap()).await;

    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::default());
    let embedder = Arc::new(EmbeddingClient::new(
        Arc::new(FaultyEmbeddingProvider),
        None,
        "fake-embed".to_string(),
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
    ));
    let pipeline = IngestionPipeline::new(pool.clone(), store.clone(), embedder);

    let err = pipeline.run(document.id, 1000, 200).await.unwrap_err();
    assert!(err.to_string().contains("embedding backend down"));

    let remaining: (i64,) = sqlx::query_as("SELECT count(*) FROM chunks WHERE document_id = $1")
        .bind(document.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining.0, 0, "chunks must be rolled back on failure");

    let row: (String, i32, Option<String>) =
        sqlx::query_as("SELECT status, error_count, last_error FROM documents WHERE id = $1")
            .bind(document.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row.0, "error");
    assert_eq!(row.1, 1);
    assert!(row.2.unwrap().contains("embedding backend down"));

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document.id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn unsupported_content_type_fails_before_touching_chunks() {
    let Some(pool) = try_connect().await else {
        eprintln!("skipping: DATABASE_URL not set or Postgres unreachable");
        return;
    };

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "irrelevant").unwrap();
    let document = insert_pending_document(&pool, "application/x-unknown", file.path().to_str().unwrap()).await;

    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::default());
    let embedder = Arc::new(EmbeddingClient::new(
        Arc::new(FakeEmbeddingProvider),
        None,
        "fake-embed".to_string(),
        RetryPolicy::default(),
    ));
    let pipeline = IngestionPipeline::new(pool.clone(), store.clone(), embedder);

    let err = pipeline.run(document.id, 1000, 200).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    let row: (String,) = sqlx::query_as("SELECT status FROM documents WHERE id = $1")
        .bind(document.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, "error");

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document.id)
        .execute(&pool)
        .await
        .unwrap();
}
