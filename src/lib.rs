//! Retrieval-Augmented Generation service core.
//!
//! Ties together document ingestion (extraction, chunking, cache-fronted
//! embedding, vector storage) and retrieval/generation (semantic search with
//! MMR reranking, multi-provider LLM dispatch, and chat memory) behind an
//! Axum HTTP API.

pub mod api;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rag;
pub mod retrieval;
pub mod retry;
pub mod vectorstore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
