//! `POST /documents/{id}/ingest`.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::{field_error, ApiError};
use super::{AppState, RequestId};
use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::pipeline::PipelineStepReport;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestQuery {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StepReport {
    pub name: &'static str,
    pub duration_ms: i64,
    pub detail: String,
}

impl From<PipelineStepReport> for StepReport {
    fn from(r: PipelineStepReport) -> Self {
        Self {
            name: r.name,
            duration_ms: r.duration_ms,
            detail: r.detail,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestionResponse {
    pub document_id: Uuid,
    pub total_duration_ms: i64,
    pub chunks_indexed: usize,
    pub steps: Vec<StepReport>,
}

/// Validate chunker bounds per spec §4.2: `200 <= chunk_size <= 4000`,
/// `0 <= chunk_overlap <= 1000`, `chunk_overlap < chunk_size`. A
/// `chunk_size` of 0 would make `chunking::hard_split`'s window loop
/// never advance, so this must run before the pipeline is invoked.
fn validate(chunk_size: usize, chunk_overlap: usize) -> Vec<serde_json::Value> {
    let mut errors = Vec::new();
    if !(200..=4000).contains(&chunk_size) {
        errors.push(field_error("chunk_size", "chunk_size must be between 200 and 4000"));
    }
    if chunk_overlap > 1000 {
        errors.push(field_error("chunk_overlap", "chunk_overlap must be between 0 and 1000"));
    }
    if chunk_overlap >= chunk_size {
        errors.push(field_error(
            "chunk_overlap",
            "chunk_overlap must be less than chunk_size",
        ));
    }
    errors
}

/// Run the ingestion pipeline for an already-registered document.
#[utoipa::path(
    post,
    path = "/documents/{id}/ingest",
    tag = "ingestion",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Ingestion completed", body = IngestionResponse),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Pipeline failure")
    )
)]
pub async fn ingest_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(document_id): Path<Uuid>,
    Query(query): Query<IngestQuery>,
) -> Result<Json<IngestionResponse>, ApiError> {
    let chunk_size = query.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
    let chunk_overlap = query.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP);

    let errors = validate(chunk_size, chunk_overlap);
    if !errors.is_empty() {
        return Err(ApiError::validation(request_id, "request validation failed", errors));
    }

    let result = state
        .pipeline
        .run(document_id, chunk_size, chunk_overlap)
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    Ok(Json(IngestionResponse {
        document_id: result.document_id,
        total_duration_ms: result.total_duration_ms,
        chunks_indexed: result.chunks_indexed,
        steps: result.steps.into_iter().map(StepReport::from).collect(),
    }))
}
