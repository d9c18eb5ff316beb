//! Redis-backed embedding cache.
//!
//! Keys are `embed:{model}:{sha256(text)}`, values are JSON-encoded
//! `Vec<f32>`, TTL is 24 hours — matching the original embedding cache
//! service. Cache unavailability is tolerated: callers fall back to a
//! direct embedding call rather than fail the request.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::warn;

const CACHE_TTL_SECONDS: u64 = 60 * 60 * 24;

pub struct EmbeddingCache {
    conn: ConnectionManager,
}

impl EmbeddingCache {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn cache_key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        format!("embed:{model}:{digest:x}")
    }

    /// Look up cached embeddings for each text, returning `None` per slot
    /// on a miss. On a Redis error the whole batch is treated as a miss.
    pub async fn get_many(&self, model: &str, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let keys: Vec<String> = texts.iter().map(|t| Self::cache_key(model, t)).collect();
        let mut conn = self.conn.clone();
        let raw: Result<Vec<Option<String>>, redis::RedisError> = conn.mget(&keys).await;
        match raw {
            Ok(values) => values
                .into_iter()
                .map(|v| v.and_then(|s| serde_json::from_str(&s).ok()))
                .collect(),
            Err(e) => {
                warn!("embedding cache get_many failed, treating as miss: {e}");
                vec![None; texts.len()]
            }
        }
    }

    /// Write back embeddings for texts that missed the cache. Failures are
    /// logged, not propagated.
    pub async fn set_many(&self, model: &str, texts: &[String], embeddings: &[Vec<f32>]) {
        if texts.is_empty() {
            return;
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (text, embedding) in texts.iter().zip(embeddings.iter()) {
            let key = Self::cache_key(model, text);
            let Ok(value) = serde_json::to_string(embedding) else {
                continue;
            };
            pipe.cmd("SETEX")
                .arg(&key)
                .arg(CACHE_TTL_SECONDS)
                .arg(value)
                .ignore();
        }
        if let Err(e) = pipe.query_async::<()>(&mut conn).await {
            warn!("embedding cache set_many failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_model_scoped() {
        let a = EmbeddingCache::cache_key("text-embedding-3-small", "hello");
        let b = EmbeddingCache::cache_key("text-embedding-3-small", "hello");
        let c = EmbeddingCache::cache_key("other-model", "hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("embed:text-embedding-3-small:"));
    }
}
