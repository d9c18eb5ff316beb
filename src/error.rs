//! Error taxonomy for the RAG service.
//!
//! `AppError` is the HTTP-facing error envelope (one variant per error kind
//! in the external API contract). Internal collaborators raise their own
//! narrower error types, which convert into `AppError` at the boundary.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// HTTP-facing application error.
///
/// Each variant carries the fields needed to render the error envelope:
/// a stable machine-readable `code`, a human `message`, and optional
/// `details`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("rate limited")]
    RateLimited,

    #[error("{0}")]
    Internal(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),
}

impl AppError {
    /// Stable machine-readable error code, per the API error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ValidationError(_) => "validation_error",
            AppError::RateLimited => "rate_limited",
            AppError::Internal(_) => "internal_error",
            AppError::UpstreamError(_) => "upstream_error",
            AppError::DependencyMissing(_) => "dependency_missing",
        }
    }

    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::ValidationError(_) => 422,
            AppError::RateLimited => 429,
            AppError::Internal(_) => 500,
            AppError::UpstreamError(_) => 502,
            AppError::DependencyMissing(_) => 503,
        }
    }

    /// Whether a retry of the operation that produced this error might
    /// succeed. Mirrors the transient-failure classification in `retry.rs`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited | AppError::UpstreamError(_) | AppError::Internal(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::UpstreamError(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization error: {e}"))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Internal(format!("cache error: {e}"))
    }
}

impl From<qdrant_client::QdrantError> for AppError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        AppError::Internal(format!("vector store error: {e}"))
    }
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedContentType(ct) => {
                AppError::BadRequest(format!("unsupported content type: {ct}"))
            }
            ExtractError::Backend(msg) => AppError::DependencyMissing(msg),
        }
    }
}

/// Errors from the text extraction backends (`extract.rs`).
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("extraction backend failed: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::Forbidden.status_code(), 403);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AppError::ValidationError("x".into()).status_code(), 422);
        assert_eq!(AppError::RateLimited.status_code(), 429);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
        assert_eq!(AppError::UpstreamError("x".into()).status_code(), 502);
        assert_eq!(AppError::DependencyMissing("x".into()).status_code(), 503);
    }

    #[test]
    fn retryable_kinds() {
        assert!(AppError::RateLimited.is_retryable());
        assert!(AppError::UpstreamError("x".into()).is_retryable());
        assert!(!AppError::BadRequest("x".into()).is_retryable());
        assert!(!AppError::NotFound("x".into()).is_retryable());
    }
}
