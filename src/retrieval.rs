//! Retrieval engine: cosine similarity, MMR reranking, semantic search.

use std::sync::Arc;

use crate::embedding::client::EmbeddingClient;
use crate::error::Result;
use crate::vectorstore::{SearchFilter, VectorHit, VectorStore};

/// One retrieved chunk, ready to be fed into prompt assembly.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub logical_id: String,
    pub score: f32,
    pub text: Option<String>,
    pub payload: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
    pub used_mmr: bool,
    pub total_candidates: usize,
}

/// Cosine similarity, returning 0.0 for zero-norm vectors rather than
/// dividing by zero (matches the original's guard).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Maximal Marginal Relevance reranking: iteratively pick the candidate
/// that maximizes `lambda * sim_to_query - (1 - lambda) * sim_to_selected`,
/// removing it from the pool each round. Ties on the MMR score are broken
/// by the candidate's original position (earlier wins), matching the
/// original implementation's stable sort over `(score, idx, candidate)`.
pub fn mmr_rerank(
    query_vector: &[f32],
    candidates: Vec<VectorHit>,
    top_k: usize,
    lambda_mult: f32,
) -> Vec<VectorHit> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut pool: Vec<(usize, VectorHit)> = candidates.into_iter().enumerate().collect();
    let mut query_sims: Vec<f32> = pool
        .iter()
        .map(|(_, c)| cosine_similarity(query_vector, &c.vector))
        .collect();
    let mut selected: Vec<VectorHit> = Vec::new();

    while !pool.is_empty() && selected.len() < top_k {
        let mut best_idx = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_raw_score = f32::NEG_INFINITY;
        let mut best_orig_idx = usize::MAX;
        for (i, (orig_idx, cand)) in pool.iter().enumerate() {
            let sim_to_query = query_sims[i];
            let sim_to_selected = selected
                .iter()
                .map(|s| cosine_similarity(&cand.vector, &s.vector))
                .fold(0.0f32, f32::max);
            let score = lambda_mult * sim_to_query - (1.0 - lambda_mult) * sim_to_selected;
            // Ties broken by descending raw score, then original insertion
            // order (earlier wins), matching the source's stable sort over
            // `(score, idx, candidate)`.
            let better = score > best_score
                || (score == best_score
                    && (cand.score > best_raw_score
                        || (cand.score == best_raw_score && *orig_idx < best_orig_idx)));
            if better {
                best_score = score;
                best_idx = i;
                best_raw_score = cand.score;
                best_orig_idx = *orig_idx;
            }
        }
        let (_, chosen) = pool.remove(best_idx);
        query_sims.remove(best_idx);
        selected.push(chosen);
    }

    selected
}

pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<EmbeddingClient>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Run semantic search: embed the query, fetch `fetch_k` candidates
    /// from the vector store (passing `score_threshold` through to the
    /// store so it can filter server-side), then fall back to a local
    /// filter in case the store didn't enforce it, then either MMR-rerank
    /// down to `top_k` or simply truncate.
    #[allow(clippy::too_many_arguments)]
    pub async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        fetch_k: Option<usize>,
        filter: &SearchFilter,
        score_threshold: Option<f32>,
        use_mmr: bool,
        mmr_lambda: f32,
    ) -> Result<RetrievalResult> {
        let query_vector = self.embedder.embed_one(query).await?;
        let candidate_limit = fetch_k.unwrap_or_else(|| (top_k * 3).max(top_k));

        let mut candidates = self
            .store
            .search(
                &query_vector,
                candidate_limit as u64,
                filter,
                score_threshold,
                use_mmr,
            )
            .await?;

        if let Some(threshold) = score_threshold {
            candidates.retain(|c| c.score >= threshold);
        }

        let total_candidates = candidates.len();

        let reranked = if use_mmr {
            mmr_rerank(&query_vector, candidates, top_k, mmr_lambda)
        } else {
            candidates.into_iter().take(top_k).collect()
        };

        let hits = reranked
            .into_iter()
            .map(|c| RetrievalHit {
                logical_id: c.logical_id,
                score: c.score,
                text: c
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                payload: c.payload,
            })
            .collect();

        Ok(RetrievalResult {
            hits,
            used_mmr: use_mmr,
            total_candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn hit(id: &str, score: f32, vector: Vec<f32>) -> VectorHit {
        VectorHit {
            logical_id: id.to_string(),
            score,
            vector,
            payload: HashMap::new(),
        }
    }

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn mmr_with_lambda_one_behaves_like_top_k_by_query_similarity() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            hit("a", 0.9, vec![1.0, 0.0]),
            hit("b", 0.5, vec![0.0, 1.0]),
            hit("c", 0.8, vec![0.9, 0.1]),
        ];
        let reranked = mmr_rerank(&query, candidates, 2, 1.0);
        let ids: Vec<&str> = reranked.iter().map(|h| h.logical_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn mmr_with_lambda_zero_maximizes_diversity() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            hit("a", 0.9, vec![1.0, 0.0]),
            hit("dup", 0.89, vec![1.0, 0.0001]),
            hit("diverse", 0.1, vec![0.0, 1.0]),
        ];
        let reranked = mmr_rerank(&query, candidates, 2, 0.0);
        assert_eq!(reranked[0].logical_id, "a");
        assert_eq!(reranked[1].logical_id, "diverse");
    }

    #[test]
    fn mmr_on_empty_candidates_returns_empty() {
        assert!(mmr_rerank(&[1.0, 0.0], Vec::new(), 5, 0.5).is_empty());
    }

    #[test]
    fn mmr_ties_break_by_raw_score_then_insertion_order() {
        // "a" and "b" are identical vectors so they share both query
        // similarity and (on round two) diversity penalty, producing an
        // exact MMR-score tie; "a"'s higher raw score must win it.
        let query = vec![1.0, 0.0];
        let candidates = vec![
            hit("a", 0.9, vec![1.0, 0.0]),
            hit("b", 0.5, vec![1.0, 0.0]),
        ];
        let reranked = mmr_rerank(&query, candidates, 1, 0.5);
        assert_eq!(reranked[0].logical_id, "a");
    }
}
