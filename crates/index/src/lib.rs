pub mod cache;
pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod metadata_store;
pub mod neo4j_store;
pub mod qdrant_index;
pub mod result;
pub mod retry;
pub mod vector;

pub use cache::{CacheStats, CachedEmbedder};
pub use embeddings::{Embedder, HashEmbedder, OllamaEmbedder};
pub use error::{Error, Result};
pub use indexer::{DirectoryReport, IndexStats, IngestFailure, IngestReport, Indexer, Stores};
pub use metadata_store::{
    ChunkRecord, DocumentDetail, DocumentRecord, MemoryMetadataStore, MetadataStore, RelatedEntity,
};
pub use neo4j_store::Neo4jStore;
pub use qdrant_index::QdrantIndex;
pub use result::RetrievalResult;
pub use retry::RetryPolicy;
pub use vector::{Filter, MemoryVectorIndex, VectorIndex, VectorRecord};
