//! Ingestion pipeline: extract -> chunk -> embed + store, with progress
//! tracking and rollback on failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunking::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::client::EmbeddingClient;
use crate::error::{AppError, Result};
use crate::extract::{extract_text, join_pages};
use crate::models::{Chunk, Document, DocumentStatus, ProcessingStep};
use crate::vectorstore::VectorStore;

/// Report for one stage of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStepReport {
    pub name: &'static str,
    pub duration_ms: i64,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub document_id: Uuid,
    pub steps: Vec<PipelineStepReport>,
    pub chunks_indexed: usize,
    pub total_duration_ms: i64,
}

pub struct IngestionPipeline {
    pool: PgPool,
    store: Arc<dyn VectorStore>,
    embedder: Arc<EmbeddingClient>,
}

impl IngestionPipeline {
    pub fn new(pool: PgPool, store: Arc<dyn VectorStore>, embedder: Arc<EmbeddingClient>) -> Self {
        Self {
            pool,
            store,
            embedder,
        }
    }

    /// Run the full ingestion flow for `document_id`. On any failure,
    /// rolls back chunks and vectors (best-effort, both attempted even if
    /// one fails) and marks the document errored, then returns the error.
    pub async fn run(
        &self,
        document_id: Uuid,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<PipelineResult> {
        let mut document = self.get_document(document_id).await?;
        let start = Instant::now();
        let mut steps = Vec::new();

        self.mark_started(&mut document).await?;
        self.update_progress(&mut document, ProcessingStep::Upload, "File registered")
            .await?;

        match self
            .run_stages(&mut document, chunk_size, chunk_overlap, &mut steps)
            .await
        {
            Ok(chunks_indexed) => {
                let total_duration_ms = start.elapsed().as_millis() as i64;
                self.mark_completed(&mut document, total_duration_ms).await?;
                Ok(PipelineResult {
                    document_id,
                    steps,
                    chunks_indexed,
                    total_duration_ms,
                })
            }
            Err(err) => {
                self.handle_failure(&mut document, &err, start).await;
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        document: &mut Document,
        chunk_size: usize,
        chunk_overlap: usize,
        steps: &mut Vec<PipelineStepReport>,
    ) -> Result<usize> {
        // Extract
        let step_start = Instant::now();
        let pages = extract_text(Path::new(&document.file_path), &document.content_type)?;
        let text = join_pages(&pages);
        steps.push(PipelineStepReport {
            name: "extract",
            duration_ms: step_start.elapsed().as_millis() as i64,
            detail: format!("{} chars extracted", text.len()),
        });
        document.text_content = Some(text.clone());
        sqlx::query("UPDATE documents SET text_content = $2, updated_at = now() WHERE id = $1")
            .bind(document.id)
            .bind(&document.text_content)
            .execute(&self.pool)
            .await?;
        self.update_progress(document, ProcessingStep::Extract, "Extraction completed")
            .await?;

        // Chunk
        let step_start = Instant::now();
        let text_chunks = chunk_text(&text, chunk_size, chunk_overlap);
        let cleaned = crate::chunking::clean_text(&text);
        let chunks = self
            .persist_chunks(document.id, &cleaned, &text_chunks)
            .await?;
        steps.push(PipelineStepReport {
            name: "chunk",
            duration_ms: step_start.elapsed().as_millis() as i64,
            detail: format!("{} chunks created", chunks.len()),
        });
        self.update_progress(document, ProcessingStep::Chunk, "Chunking completed")
            .await?;

        // Embed + store
        let step_start = Instant::now();
        let indexed = self.embed_and_store(document, &chunks).await?;
        steps.push(PipelineStepReport {
            name: "embed_store",
            duration_ms: step_start.elapsed().as_millis() as i64,
            detail: format!("{indexed} vectors stored"),
        });
        self.update_progress(document, ProcessingStep::EmbedStore, "Embeddings stored")
            .await?;

        Ok(indexed)
    }

    async fn persist_chunks(
        &self,
        document_id: Uuid,
        cleaned_text: &str,
        text_chunks: &[crate::chunking::TextChunk],
    ) -> Result<Vec<Chunk>> {
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        let mut chunks = Vec::with_capacity(text_chunks.len());
        for (idx, tc) in text_chunks.iter().enumerate() {
            let content = &cleaned_text[tc.char_start..tc.char_end];
            let id = Uuid::new_v4();
            let rec: Chunk = sqlx::query_as(
                "INSERT INTO chunks (id, document_id, chunk_index, content, char_start, char_end, page, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, NULL, now())
                 RETURNING id, document_id, chunk_index, content, char_start, char_end, page, created_at",
            )
            .bind(id)
            .bind(document_id)
            .bind(idx as i32)
            .bind(content)
            .bind(tc.char_start as i32)
            .bind(tc.char_end as i32)
            .fetch_one(&self.pool)
            .await?;
            chunks.push(rec);
        }
        Ok(chunks)
    }

    async fn embed_and_store(&self, document: &Document, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            self.store.delete_by_document_id(&document.id.to_string()).await?;
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let logical_ids: Vec<String> = chunks.iter().map(|c| c.logical_id()).collect();
        let payloads: Vec<HashMap<String, serde_json::Value>> = chunks
            .iter()
            .map(|c| {
                let mut p = HashMap::new();
                p.insert("text".to_string(), json!(c.content));
                p.insert("chunk_index".to_string(), json!(c.chunk_index));
                p.insert("document_id".to_string(), json!(document.id.to_string()));
                p.insert(
                    "document_owner_id".to_string(),
                    json!(document.owner_id.to_string()),
                );
                p.insert("document_name".to_string(), json!(document.name));
                p.insert(
                    "document_original_filename".to_string(),
                    json!(document.original_filename),
                );
                p.insert("content_type".to_string(), json!(document.content_type));
                p.insert(
                    "document_created_at_ts".to_string(),
                    json!(document.created_at.timestamp()),
                );
                p
            })
            .collect();

        self.store.delete_by_document_id(&document.id.to_string()).await?;
        self.store.upsert(&logical_ids, &embeddings, &payloads).await?;
        Ok(logical_ids.len())
    }

    async fn handle_failure(&self, document: &mut Document, err: &AppError, start: Instant) {
        tracing::error!(error = %err, document_id = %document.id, "ingestion pipeline failed");

        if let Err(e) = sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document.id)
            .execute(&self.pool)
            .await
        {
            warn!("failed to rollback chunks for document {}: {e}", document.id);
        }
        if let Err(e) = self.store.delete_by_document_id(&document.id.to_string()).await {
            warn!(
                "failed to rollback vectors for document {}: {e}",
                document.id
            );
        }

        document.status = DocumentStatus::Error;
        document.processing_step = ProcessingStep::Error;
        document.error_count += 1;
        document.last_error = Some(err.to_string());
        let duration_ms = start.elapsed().as_millis() as i64;

        // processing_progress is left untouched: spec's state diagram freezes
        // progress at whatever value the last successful stage reached.
        let _ = sqlx::query(
            "UPDATE documents SET status = $2, processing_step = $3,
             processing_completed_at = now(), processing_duration_ms = $4, error_count = $5,
             last_error = $6, updated_at = now() WHERE id = $1",
        )
        .bind(document.id)
        .bind(document.status)
        .bind(document.processing_step)
        .bind(duration_ms)
        .bind(document.error_count)
        .bind(&document.last_error)
        .execute(&self.pool)
        .await;
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Document> {
        sqlx::query_as(
            "SELECT id, owner_id, name, original_filename, content_type, file_path, file_size,
             text_content, status, processing_step, processing_progress, processing_started_at,
             processing_completed_at, processing_duration_ms, error_count, last_error,
             is_deleted, created_at, updated_at
             FROM documents WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("document {document_id} not found")))
    }

    /// Transition the document into `processing[upload]`, guarded so a
    /// second concurrent run on the same document is rejected rather than
    /// racing the first (spec §5: "concurrent runs are an error").
    async fn mark_started(&self, document: &mut Document) -> Result<()> {
        document.status = DocumentStatus::Processing;
        document.processing_step = ProcessingStep::Upload;
        document.processing_progress = 0;
        document.error_count = 0;
        document.last_error = None;
        let rows = sqlx::query(
            "UPDATE documents SET status = $2, processing_step = $3, processing_progress = 0,
             processing_started_at = now(), processing_completed_at = NULL,
             processing_duration_ms = NULL, last_error = NULL, updated_at = now()
             WHERE id = $1 AND status != 'processing'",
        )
        .bind(document.id)
        .bind(document.status)
        .bind(document.processing_step)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::Conflict(format!(
                "document {} is already being processed",
                document.id
            )));
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        document: &mut Document,
        step: ProcessingStep,
        message: &str,
    ) -> Result<()> {
        document.processing_step = step;
        document.processing_progress = step.progress_percent();
        document.status = DocumentStatus::Processing;
        sqlx::query(
            "UPDATE documents SET processing_step = $2, processing_progress = $3,
             status = $4, updated_at = now() WHERE id = $1",
        )
        .bind(document.id)
        .bind(document.processing_step)
        .bind(document.processing_progress)
        .bind(document.status)
        .execute(&self.pool)
        .await?;
        info!(document_id = %document.id, "{message}");
        Ok(())
    }

    async fn mark_completed(&self, document: &mut Document, total_duration_ms: i64) -> Result<()> {
        document.status = DocumentStatus::Completed;
        document.processing_step = ProcessingStep::Completed;
        document.processing_progress = 100;
        sqlx::query(
            "UPDATE documents SET status = $2, processing_step = $3, processing_progress = 100,
             processing_completed_at = now(), processing_duration_ms = $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(document.id)
        .bind(document.status)
        .bind(document.processing_step)
        .bind(total_duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
