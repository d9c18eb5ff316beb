//! Base HTTP client shared by the LLM provider adapters.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Base HTTP client for LLM providers.
pub struct HttpProviderClient {
    client: Client,
    timeout: Duration,
}

impl HttpProviderClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: Vec<(&str, &str)>,
    ) -> Result<R> {
        debug!("POST {}", url);
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| AppError::UpstreamError("request timed out".to_string()))?
            .map_err(AppError::from)?;

        self.handle_response(response).await
    }

    /// Issue a POST for a streaming response and return the raw response
    /// for the caller to consume as a byte stream (used for OpenAI's SSE
    /// chat-completion stream).
    pub async fn post_json_streaming<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        headers: Vec<(&str, &str)>,
    ) -> Result<Response> {
        debug!("POST (stream) {}", url);
        let mut request = self.client.post(url).json(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(AppError::from)?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(Self::status_to_error(status, text));
        }
        Ok(response)
    }

    async fn handle_response<R: DeserializeOwned>(&self, response: Response) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {status} error"));
            error!("provider API error ({status}): {error_text}");
            return Err(Self::status_to_error(status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::UpstreamError(format!("invalid response body: {e}")))
    }

    /// Classify a non-2xx provider response. Only the enumerated transient
    /// set (408, 429, 500, 502, 503, 504) maps to a retryable error; domain
    /// errors like 400/403/404/422 are never transient and must not be
    /// retried against the caller's retry budget.
    fn status_to_error(status: reqwest::StatusCode, body: String) -> AppError {
        match status.as_u16() {
            400 => AppError::BadRequest(body),
            401 => AppError::Unauthorized,
            403 => AppError::Forbidden,
            404 => AppError::NotFound(body),
            409 => AppError::Conflict(body),
            422 => AppError::ValidationError(body),
            429 => AppError::RateLimited,
            408 | 500 | 502 | 503 | 504 => AppError::UpstreamError(body),
            other if other < 500 => AppError::BadRequest(body),
            _ => AppError::UpstreamError(body),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Common trait for OpenAI-compatible API adapters.
pub trait OpenAICompatible {
    fn base_url(&self) -> &str;

    fn api_key(&self) -> Option<&str>;

    fn additional_headers(&self) -> Vec<(&str, &str)> {
        Vec::new()
    }

    fn auth_headers(&self) -> Vec<(&str, String)> {
        let mut headers = Vec::new();
        if let Some(key) = self.api_key() {
            headers.push(("Authorization", format!("Bearer {key}")));
        }
        headers
    }

    fn build_url(&self, endpoint: &str) -> String {
        let base = self.base_url().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestAdapter {
        base_url: String,
        api_key: Option<String>,
    }

    impl OpenAICompatible for TestAdapter {
        fn base_url(&self) -> &str {
            &self.base_url
        }

        fn api_key(&self) -> Option<&str> {
            self.api_key.as_deref()
        }
    }

    #[test]
    fn builds_urls_regardless_of_slashes() {
        let adapter = TestAdapter {
            base_url: "https://api.example.com/v1".to_string(),
            api_key: Some("test-key".to_string()),
        };
        assert_eq!(
            adapter.build_url("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            adapter.build_url("/embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn domain_status_codes_are_not_retryable() {
        let err = HttpProviderClient::status_to_error(
            reqwest::StatusCode::NOT_FOUND,
            "missing".to_string(),
        );
        assert!(!err.is_retryable());
        let err = HttpProviderClient::status_to_error(
            reqwest::StatusCode::BAD_REQUEST,
            "bad".to_string(),
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_status_codes_are_retryable() {
        for status in [
            reqwest::StatusCode::REQUEST_TIMEOUT,
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::BAD_GATEWAY,
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = HttpProviderClient::status_to_error(status, "x".to_string());
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn auth_header_is_bearer() {
        let adapter = TestAdapter {
            base_url: "https://api.example.com".to_string(),
            api_key: Some("test-key".to_string()),
        };
        let headers = adapter.auth_headers();
        assert_eq!(headers, vec![("Authorization", "Bearer test-key".to_string())]);
    }
}
