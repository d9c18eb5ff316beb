//! `POST /search`.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::error::{field_error, ApiError};
use super::{AppState, RequestId};
use crate::vectorstore::SearchFilter;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchFiltersRequest {
    pub document_id: Option<String>,
    pub owner_id: Option<String>,
    pub content_type: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub fetch_k: Option<usize>,
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub use_mmr: bool,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    pub filters: Option<SearchFiltersRequest>,
}

fn default_mmr_lambda() -> f32 {
    0.5
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub text: Option<String>,
    pub payload: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub used_mmr: bool,
    pub total_candidates: usize,
}

fn validate(request: &SearchRequest) -> Vec<Value> {
    let mut errors = Vec::new();
    if request.query.trim().is_empty() {
        errors.push(field_error("query", "query must not be empty"));
    }
    if !(1..=50).contains(&request.top_k) {
        errors.push(field_error("top_k", "top_k must be between 1 and 50"));
    }
    if let Some(fetch_k) = request.fetch_k {
        if !(1..=200).contains(&fetch_k) {
            errors.push(field_error("fetch_k", "fetch_k must be between 1 and 200"));
        } else if fetch_k < request.top_k {
            errors.push(field_error("fetch_k", "fetch_k must be >= top_k"));
        }
    }
    if let Some(threshold) = request.score_threshold {
        if !(-1.0..=1.0).contains(&threshold) {
            errors.push(field_error(
                "score_threshold",
                "score_threshold must be between -1 and 1",
            ));
        }
    }
    if !(0.0..=1.0).contains(&request.mmr_lambda) {
        errors.push(field_error("mmr_lambda", "mmr_lambda must be between 0 and 1"));
    }
    if let Some(filters) = &request.filters {
        if let (Some(from), Some(to)) = (filters.created_from, filters.created_to) {
            if from > to {
                errors.push(field_error(
                    "filters.created_from",
                    "created_from must be <= created_to",
                ));
            }
        }
    }
    errors
}

/// Retrieve the most relevant chunks for a query, optionally MMR-reranked.
#[utoipa::path(
    post,
    path = "/search",
    tag = "retrieval",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Search results", body = SearchResponse),
        (status = 422, description = "Request validation failed")
    )
)]
pub async fn search_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let errors = validate(&request);
    if !errors.is_empty() {
        return Err(ApiError::validation(
            request_id,
            "request validation failed",
            errors,
        ));
    }

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

    let result = state
        .retrieval
        .semantic_search(
            &request.query,
            request.top_k,
            request.fetch_k,
            &filter,
            request.score_threshold,
            request.use_mmr,
            request.mmr_lambda,
        )
        .await
        .map_err(|e| ApiError::new(e, request_id))?;

    Ok(Json(SearchResponse {
        results: result
            .hits
            .into_iter()
            .map(|h| SearchHit {
                id: h.logical_id,
                score: h.score,
                text: h.text,
                payload: h.payload,
            })
            .collect(),
        used_mmr: result.used_mmr,
        total_candidates: result.total_candidates,
    }))
}
