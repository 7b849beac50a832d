mod config;
mod error;
mod metrics;
mod routes;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, EmbeddingBackend, LogFormat, StorageBackend};
use extract::{EntityExtractor, PatternExtractor};
use index::{
    CachedEmbedder, Embedder, HashEmbedder, Indexer, Neo4jStore, OllamaEmbedder, QdrantIndex,
    RetryPolicy, Stores,
};
use ingest::{Chunker, ChunkerConfig};
use query::{AnswerGenerator, LlmEndpoint, QueryService, RetrievalEngine};
use raptor::TreeBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::build().context("Failed to load configuration")?;

    init_tracing(&config);
    tracing::info!(
        embedding = ?config.embedding.backend,
        storage = ?config.storage.backend,
        "Starting retrieval service"
    );

    let retry = RetryPolicy::from(&config.retry);
    let embedder = build_embedder(&config, &retry);
    let extractor: Arc<dyn EntityExtractor> = Arc::new(PatternExtractor::default());
    let stores = build_stores(&config, &retry).await?;

    let chunker = Chunker::new(ChunkerConfig::from(&config.chunking))
        .context("Invalid chunking configuration")?;
    let tree_builder = TreeBuilder::new(config.raptor.n_clusters).with_seed(config.raptor.seed);

    let indexer = Indexer::new(
        chunker,
        tree_builder,
        embedder.clone(),
        extractor.clone(),
        stores.clone(),
    );
    let engine = RetrievalEngine::new(embedder, extractor, stores, config.retrieval.clone());
    let generator = AnswerGenerator::new(config.llm.model.clone().map(|model| LlmEndpoint {
        base_url: config.llm.url.clone(),
        model,
    }))
    .with_retry(retry);
    if !generator.is_configured() {
        tracing::info!("No answer model configured, /answer returns a placeholder");
    }

    let state = Arc::new(routes::AppState {
        indexer,
        service: QueryService::new(engine, generator),
        metrics: metrics::Metrics::new(),
        default_top_k: config.retrieval.top_k,
    });
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn build_embedder(config: &AppConfig, retry: &RetryPolicy) -> Arc<dyn Embedder> {
    let base: Arc<dyn Embedder> = match config.embedding.backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embedding.dimension)),
        EmbeddingBackend::Ollama => Arc::new(
            OllamaEmbedder::new(config.embedding.url.clone(), config.embedding.model.clone())
                .with_retry(retry.clone()),
        ),
    };

    if config.cache.enabled {
        Arc::new(CachedEmbedder::new(base, config.cache.max_entries))
    } else {
        base
    }
}

async fn build_stores(config: &AppConfig, retry: &RetryPolicy) -> anyhow::Result<Stores> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Memory => Ok(Stores::in_memory()),
        StorageBackend::External => {
            let dimension = config.embedding.dimension;
            let chunks = QdrantIndex::new(
                storage.qdrant_url.clone(),
                storage.chunk_collection.clone(),
                dimension,
            )
            .with_retry(retry.clone());
            let tree = QdrantIndex::new(
                storage.qdrant_url.clone(),
                storage.tree_collection.clone(),
                dimension,
            )
            .with_retry(retry.clone());
            chunks.init_collection().await?;
            tree.init_collection().await?;

            let metadata = Neo4jStore::connect(
                &storage.neo4j_uri,
                &storage.neo4j_user,
                &storage.neo4j_password,
            )
            .await?;
            metadata.init_schema().await?;

            tracing::info!(
                qdrant = %storage.qdrant_url,
                neo4j = %storage.neo4j_uri,
                "Connected to external stores"
            );
            Ok(Stores {
                chunks: Arc::new(chunks),
                tree: Arc::new(tree),
                metadata: Arc::new(metadata),
            })
        }
    }
}
