//! Embedding cache and cache-through client.

pub mod cache;
pub mod client;

pub use cache::EmbeddingCache;
pub use client::EmbeddingClient;
