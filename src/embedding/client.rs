//! Cache-through batch embedding client.
//!
//! Mirrors the original `embed_with_cache`: look up each text in the
//! cache, issue one provider call covering only the misses, then merge
//! results back into the original order and write the misses back to the
//! cache.

use std::sync::Arc;

use crate::embedding::cache::EmbeddingCache;
use crate::error::Result;
use crate::llm::provider::LlmProvider;
use crate::retry::{retry_transient, RetryPolicy};

pub struct EmbeddingClient {
    provider: Arc<dyn LlmProvider>,
    cache: Option<Arc<EmbeddingCache>>,
    model: String,
    retry_policy: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        cache: Option<Arc<EmbeddingCache>>,
        model: String,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            model,
            retry_policy,
        }
    }

    /// Embed a batch of texts, using the cache for as many as possible and
    /// issuing provider calls only for the misses.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        if let Some(cache) = &self.cache {
            let cached = cache.get_many(&self.model, texts).await;
            results = cached;
        }

        let miss_indices: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();

        if !miss_indices.is_empty() {
            let miss_texts: Vec<String> = miss_indices.iter().map(|&i| texts[i].clone()).collect();

            // One provider request covers every cache miss, per the
            // embedding contract: "issue one provider request with the
            // missing texts in order."
            let provider = self.provider.clone();
            let responses = retry_transient(self.retry_policy, || {
                let provider = provider.clone();
                let miss_texts = miss_texts.clone();
                async move { provider.embed_batch(&miss_texts).await }
            })
            .await?;

            let embeddings: Vec<Vec<f32>> = responses.into_iter().map(|r| r.embedding).collect();

            if let Some(cache) = &self.cache {
                cache.set_many(&self.model, &miss_texts, &embeddings).await;
            }

            for (idx, embedding) in miss_indices.into_iter().zip(embeddings.into_iter()) {
                results[idx] = Some(embedding);
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(batch.into_iter().next().unwrap_or_default())
    }
}
