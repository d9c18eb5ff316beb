//! Error envelope: converts `AppError` into the JSON body + status code
//! contract every failure response follows.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub request_id: String,
}

/// Wraps an `AppError` with the request id of the request that produced it,
/// so the error envelope can echo it in the JSON body and the `X-Request-ID`
/// header stays consistent with the body (stamped separately by the
/// request-id middleware).
pub struct ApiError {
    pub inner: AppError,
    pub request_id: Uuid,
    pub details: Option<Vec<Value>>,
}

impl ApiError {
    pub fn new(inner: AppError, request_id: Uuid) -> Self {
        Self {
            inner,
            request_id,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Build a `validation_error` directly, for request-shape checks that
    /// never reach a collaborator.
    pub fn validation(request_id: Uuid, message: impl Into<String>, details: Vec<Value>) -> Self {
        Self {
            inner: AppError::ValidationError(message.into()),
            request_id,
            details: Some(details),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.inner.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.inner.code(),
                message: self.inner.to_string(),
                details: self.details,
            },
            request_id: self.request_id.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A validation-field detail entry in the shape spec §7 describes.
pub fn field_error(field: &str, msg: &str) -> Value {
    serde_json::json!({ "type": "value_error", "loc": [field], "msg": msg })
}
