//! RAG service entrypoint: wires configuration, storage backends, LLM
//! providers, and the Axum router into one running HTTP server.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rag_service::api::{create_router, AppState};
use rag_service::chat::ChatMemory;
use rag_service::config::AppConfig;
use rag_service::db;
use rag_service::embedding::cache::EmbeddingCache;
use rag_service::embedding::client::EmbeddingClient;
use rag_service::llm::provider::LlmProvider;
use rag_service::llm::providers::{AnthropicProvider, GoogleProvider, OpenAIProvider};
use rag_service::pipeline::IngestionPipeline;
use rag_service::rag::RagAnswerer;
use rag_service::retrieval::RetrievalEngine;
use rag_service::vectorstore::{QdrantVectorStore, VectorStore};

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rag_service=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn build_providers(config: &AppConfig) -> HashMap<&'static str, Arc<dyn LlmProvider>> {
    let mut providers: HashMap<&'static str, Arc<dyn LlmProvider>> = HashMap::new();

    if let Some(key) = &config.openai_api_key {
        providers.insert(
            "openai",
            OpenAIProvider::from_config(key.clone(), config.llm_model.clone(), config.embedding_model.clone()),
        );
    } else {
        warn!("OPENAI_API_KEY not set, OpenAI provider unavailable");
    }

    if let Some(key) = &config.anthropic_api_key {
        providers.insert(
            "anthropic",
            AnthropicProvider::from_config(key.clone(), config.llm_model.clone()),
        );
    }

    if let Some(key) = &config.gemini_api_key {
        providers.insert(
            "google",
            GoogleProvider::from_config(key.clone(), config.llm_model.clone(), config.embedding_model.clone()),
        );
    }

    providers
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    info!("starting rag-service v{}", rag_service::VERSION);

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    info!("connected to postgres and ran migrations");

    let cache = match EmbeddingCache::connect(&config.redis_url).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            warn!("embedding cache unavailable, degrading to direct provider calls: {e}");
            None
        }
    };

    let qdrant = qdrant_client::Qdrant::from_url(&config.qdrant_url).build()?;
    let store: Arc<dyn VectorStore> =
        Arc::new(QdrantVectorStore::new(qdrant, config.qdrant_collection.clone()));
    store.ensure_collection(config.embedding_dim as u64).await?;

    let providers = build_providers(&config);
    let embedding_provider = providers
        .get("openai")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("an OpenAI provider is required for embeddings"))?;

    let embedder = Arc::new(EmbeddingClient::new(
        embedding_provider,
        cache,
        config.embedding_model.clone(),
        config.retry,
    ));

    let pipeline = Arc::new(IngestionPipeline::new(pool.clone(), store.clone(), embedder.clone()));
    let retrieval = Arc::new(RetrievalEngine::new(store.clone(), embedder.clone()));
    let rag = Arc::new(RagAnswerer::new(providers));
    let chat = Arc::new(ChatMemory::new(pool.clone()));

    let state = AppState {
        pool,
        pipeline,
        retrieval,
        rag,
        chat,
        config: Arc::new(config),
    };

    let router = create_router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{host}:{port}");

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
