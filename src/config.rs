//! Environment-driven application configuration.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

/// Top-level configuration, loaded once at startup from the process
/// environment (see spec's external-interfaces environment variable list).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub embedding_dim: usize,
    pub embedding_model: String,
    pub llm_model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub retry: RetryPolicy,
    pub access_token_expire_minutes: u64,
    pub max_upload_size_bytes: u64,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from the environment, applying the defaults
    /// named in spec §6 for anything unset.
    pub fn from_env() -> Result<Self> {
        let database_url = env_var("DATABASE_URL").ok_or_else(|| {
            AppError::Internal("DATABASE_URL environment variable is required".to_string())
        })?;

        let cfg = Self {
            database_url,
            redis_url: env_var("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".into()),
            qdrant_url: env_var("QDRANT_URL").unwrap_or_else(|| "http://localhost:6334".into()),
            qdrant_collection: env_var("QDRANT_COLLECTION").unwrap_or_else(|| "documents".into()),
            embedding_dim: env_parse("EMBEDDING_DIM", 1536),
            embedding_model: env_var("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".into()),
            llm_model: env_var("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            openai_api_key: env_var("OPENAI_API_KEY"),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
            gemini_api_key: env_var("GEMINI_API_KEY").or_else(|| env_var("GOOGLE_API_KEY")),
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
                min_backoff: Duration::from_secs_f64(env_parse(
                    "RETRY_MIN_BACKOFF_SECONDS",
                    0.5,
                )),
                max_backoff: Duration::from_secs_f64(env_parse("RETRY_MAX_BACKOFF_SECONDS", 8.0)),
            },
            access_token_expire_minutes: env_parse("ACCESS_TOKEN_EXPIRE_MINUTES", 60),
            max_upload_size_bytes: env_parse("MAX_UPLOAD_SIZE", 25 * 1024 * 1024),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(AppError::Internal(
                "EMBEDDING_DIM must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Internal(
                "RETRY_MAX_ATTEMPTS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn loads_defaults_when_optional_vars_unset() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("EMBEDDING_DIM");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.redis_url, "redis://localhost:6379");
        assert_eq!(cfg.embedding_dim, 1536);
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    #[serial]
    fn requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(AppConfig::from_env().is_err());
    }
}
