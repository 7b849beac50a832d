//! Ingestion orchestration: parse, segment, embed, and write one document
//! to every store as a single unit.

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use extract::{EntityExtractor, GraphBuilder};
use ingest::{Chunk, Chunker, DocumentReader, Metadata, ParsedDocument, Strategy};
use raptor::{TreeBuilder, TreeNode};

use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::metadata_store::{ChunkRecord, DocumentRecord, MetadataStore};
use crate::vector::{Filter, MemoryVectorIndex, VectorIndex, VectorRecord};

/// The three backing stores shared by ingestion and retrieval.
#[derive(Clone)]
pub struct Stores {
    pub chunks: Arc<dyn VectorIndex>,
    pub tree: Arc<dyn VectorIndex>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            chunks: Arc::new(MemoryVectorIndex::new("chunks")),
            tree: Arc::new(MemoryVectorIndex::new("raptor_nodes")),
            metadata: Arc::new(crate::metadata_store::MemoryMetadataStore::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub filename: String,
    pub strategy: Strategy,
    pub chunk_count: usize,
    pub graph_edges: usize,
    pub entity_count: usize,
    pub tree_nodes: usize,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryReport {
    pub ingested: Vec<IngestReport>,
    pub failed: Vec<IngestFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunk_vectors: usize,
    pub tree_vectors: usize,
}

pub struct Indexer {
    chunker: Chunker,
    tree_builder: TreeBuilder,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    stores: Stores,
}

impl Indexer {
    pub fn new(
        chunker: Chunker,
        tree_builder: TreeBuilder,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        stores: Stores,
    ) -> Self {
        Self {
            chunker,
            tree_builder,
            embedder,
            extractor,
            stores,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let parsed = DocumentReader::read(path).await?;
        let filename = ingest::reader::file_name(path);
        self.ingest_parsed(parsed, &filename).await
    }

    /// Ingest every supported file below `dir`. One bad file does not stop
    /// the others; it is reported in `failed`.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<DirectoryReport> {
        let documents = DocumentReader::read_directory(dir).await?;
        let mut report = DirectoryReport::default();

        for (path, parsed) in documents {
            let filename = ingest::reader::file_name(Path::new(&path));
            match self.ingest_parsed(parsed, &filename).await {
                Ok(ingested) => report.ingested.push(ingested),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping document");
                    report.failed.push(IngestFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    pub async fn ingest_parsed(&self, parsed: ParsedDocument, filename: &str) -> Result<IngestReport> {
        let (strategy, mut chunks) = ingest::chunk_document(&self.chunker, &parsed);
        if chunks.is_empty() {
            tracing::warn!(filename, "No chunks produced, refusing to index");
            return Err(Error::EmptyExtraction {
                filename: filename.to_string(),
            });
        }

        let doc_id = Uuid::new_v4().to_string();
        let source_type = parsed
            .metadata
            .get("source_type")
            .and_then(|v| v.as_str())
            .unwrap_or("local")
            .to_string();
        for chunk in &mut chunks {
            chunk.metadata.insert("doc_id".to_string(), doc_id.clone().into());
            chunk.metadata.insert("source_type".to_string(), source_type.clone().into());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .encode(&texts)
            .await
            .map_err(|e| Error::collaborator("embed chunks", e))?;
        if vectors.len() != chunks.len() {
            return Err(Error::collaborator(
                "embed chunks",
                anyhow!("expected {} vectors, got {}", chunks.len(), vectors.len()),
            ));
        }
        if let Some(i) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(Error::collaborator(
                "embed chunks",
                anyhow!("vector {i} has a non-finite component"),
            ));
        }

        match self
            .write(&doc_id, filename, strategy, &parsed, &chunks, &vectors)
            .await
        {
            Ok(report) => {
                tracing::info!(
                    doc_id = %report.doc_id,
                    filename,
                    strategy = %strategy,
                    chunks = report.chunk_count,
                    edges = report.graph_edges,
                    tree_nodes = report.tree_nodes,
                    "Indexed document"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(doc_id = %doc_id, filename, error = %e, "Ingestion failed, rolling back");
                self.purge(&doc_id).await;
                Err(e)
            }
        }
    }

    async fn write(
        &self,
        doc_id: &str,
        filename: &str,
        strategy: Strategy,
        parsed: &ParsedDocument,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<IngestReport> {
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.storage_id(doc_id),
                vector: vector.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();
        self.stores
            .chunks
            .add(records)
            .await
            .map_err(|e| Error::collaborator("store chunk vectors", e))?;

        let mut tree_nodes = 0;
        if chunks.len() >= 2 {
            let nodes = self.tree_builder.build(chunks, vectors, doc_id);
            tree_nodes = nodes.len();
            let records = nodes
                .into_iter()
                .map(|node| tree_record(node, vectors))
                .collect();
            self.stores
                .tree
                .add(records)
                .await
                .map_err(|e| Error::collaborator("store tree nodes", e))?;
        }

        let document = DocumentRecord {
            id: doc_id.to_string(),
            filename: filename.to_string(),
            format: parsed.format().to_string(),
            strategy: strategy.to_string(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        };
        let chunk_records: Vec<ChunkRecord> =
            chunks.iter().map(|c| ChunkRecord::new(doc_id, c)).collect();
        self.stores
            .metadata
            .add_document(&document, &chunk_records)
            .await
            .map_err(|e| Error::collaborator("store document", e))?;

        let graph = GraphBuilder::new(self.extractor.as_ref()).build(chunks, doc_id);
        self.stores
            .metadata
            .add_graph(doc_id, &graph.edges, &graph.entity_chunks)
            .await
            .map_err(|e| Error::collaborator("store graph", e))?;

        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            strategy,
            chunk_count: chunks.len(),
            graph_edges: graph.edges.len(),
            entity_count: graph.entity_count(),
            tree_nodes,
            metadata: parsed.metadata.clone(),
        })
    }

    /// Remove a document from every store. Returns whether its metadata
    /// record existed.
    pub async fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let filter = Filter::doc(doc_id);
        self.stores
            .chunks
            .delete(&filter)
            .await
            .map_err(|e| Error::collaborator("delete chunk vectors", e))?;
        self.stores
            .tree
            .delete(&filter)
            .await
            .map_err(|e| Error::collaborator("delete tree nodes", e))?;
        let existed = self
            .stores
            .metadata
            .delete_document(doc_id)
            .await
            .map_err(|e| Error::collaborator("delete document", e))?;

        tracing::info!(doc_id, existed, "Deleted document");
        Ok(existed)
    }

    /// Best-effort cleanup after a failed write.
    async fn purge(&self, doc_id: &str) {
        if let Err(e) = self.delete_document(doc_id).await {
            tracing::warn!(doc_id, error = %e, "Rollback incomplete");
        }
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let documents = self
            .stores
            .metadata
            .document_count()
            .await
            .map_err(|e| Error::collaborator("count documents", e))?;
        let chunk_vectors = self
            .stores
            .chunks
            .count()
            .await
            .map_err(|e| Error::collaborator("count chunk vectors", e))?;
        let tree_vectors = self
            .stores
            .tree
            .count()
            .await
            .map_err(|e| Error::collaborator("count tree nodes", e))?;

        Ok(IndexStats {
            documents,
            chunk_vectors,
            tree_vectors,
        })
    }
}

/// Tree nodes reuse the vector of the chunk that stands for them.
fn tree_record(node: TreeNode, vectors: &[Vec<f32>]) -> VectorRecord {
    let mut metadata = Metadata::new();
    metadata.insert("doc_id".to_string(), node.metadata.doc_id.clone().into());
    metadata.insert(
        "raptor_level".to_string(),
        u64::from(node.metadata.level).into(),
    );
    if let Some(chunk_index) = node.metadata.chunk_index {
        metadata.insert("chunk_index".to_string(), chunk_index.into());
    }
    if !node.metadata.represents.is_empty() {
        metadata.insert("represents".to_string(), node.metadata.represents.clone().into());
    }

    VectorRecord {
        id: node.chunk_id,
        vector: vectors[node.source_chunk].clone(),
        text: node.text,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::result::RetrievalResult;
    use async_trait::async_trait;
    use extract::PatternExtractor;
    use ingest::{Block, ChunkerConfig};

    fn indexer_with(stores: Stores, chunk_size: usize) -> Indexer {
        Indexer::new(
            Chunker::new(ChunkerConfig::new(chunk_size, 0)).unwrap(),
            TreeBuilder::new(2),
            Arc::new(HashEmbedder::new(64)),
            Arc::new(PatternExtractor::default()),
            stores,
        )
    }

    /// Three short chunks with the dynamic strategy.
    fn paris_document() -> ParsedDocument {
        ParsedDocument::from_text("")
            .with_structure(vec![
                Block::heading(1, "CITIES"),
                Block::paragraph("Paris is nice"),
                Block::heading(1, "LANDMARKS"),
                Block::paragraph("Paris has the Eiffel Tower"),
                Block::paragraph("Berlin is far from Paris"),
            ])
            .with_metadata("format", "md")
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        fn name(&self) -> &str {
            "failing"
        }
        async fn add(&self, _records: Vec<VectorRecord>) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
        async fn query(
            &self,
            _vector: &[f32],
            _k: usize,
            _filter: Option<&Filter>,
        ) -> anyhow::Result<Vec<RetrievalResult>> {
            Ok(Vec::new())
        }
        async fn get(&self, _ids: &[String]) -> anyhow::Result<Vec<RetrievalResult>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _filter: &Filter) -> anyhow::Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    struct NanEmbedder;

    #[async_trait]
    impl Embedder for NanEmbedder {
        fn model_name(&self) -> &str {
            "nan"
        }
        async fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| if i == 1 { vec![f32::NAN, 0.0] } else { vec![1.0, 0.0] })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_every_store() {
        let stores = Stores::in_memory();
        let indexer = indexer_with(stores.clone(), 40);

        let report = indexer.ingest_parsed(paris_document(), "cities.md").await.unwrap();

        assert_eq!(report.strategy, Strategy::Dynamic);
        assert_eq!(report.chunk_count, 3);
        assert!(report.graph_edges >= 1);
        assert!(report.tree_nodes >= 4);

        let stats = indexer.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunk_vectors, 3);
        assert_eq!(stats.tree_vectors, report.tree_nodes);

        let chunk = stores
            .chunks
            .get(&[format!("{}_1", report.doc_id)])
            .await
            .unwrap();
        assert_eq!(chunk[0].doc_id(), Some(report.doc_id.as_str()));
        assert_eq!(chunk[0].metadata["source_type"], "local");
        assert_eq!(chunk[0].metadata["strategy"], "dynamic");

        let level_one = stores
            .tree
            .query(&[0.0; 64], 10, Some(&Filter::doc(&report.doc_id).eq("raptor_level", 1)))
            .await
            .unwrap();
        assert!(!level_one.is_empty());
        assert!(level_one.iter().all(|r| r.metadata.contains_key("represents")));

        let detail = stores.metadata.get_document(&report.doc_id).await.unwrap().unwrap();
        assert_eq!(detail.document.filename, "cities.md");
        assert_eq!(detail.document.format, "md");
        assert_eq!(detail.chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_single_chunk_document_has_no_tree() {
        let stores = Stores::in_memory();
        let indexer = indexer_with(stores.clone(), 1024);

        let report = indexer
            .ingest_parsed(ParsedDocument::from_text("Paris is nice"), "one.txt")
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.tree_nodes, 0);
        assert_eq!(stores.tree.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected_before_any_write() {
        let stores = Stores::in_memory();
        let indexer = indexer_with(stores.clone(), 100);

        let err = indexer
            .ingest_parsed(ParsedDocument::from_text("  \n\n  "), "blank.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyExtraction { ref filename } if filename == "blank.txt"));
        assert_eq!(indexer.stats().await.unwrap().documents, 0);
        assert_eq!(stores.chunks.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let mut stores = Stores::in_memory();
        stores.tree = Arc::new(FailingIndex);
        let indexer = indexer_with(stores.clone(), 40);

        let err = indexer.ingest_parsed(paris_document(), "cities.md").await.unwrap_err();

        assert!(matches!(err, Error::CollaboratorUnavailable { .. }));
        assert_eq!(stores.chunks.count().await.unwrap(), 0);
        assert!(stores.metadata.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_is_collaborator_error() {
        let stores = Stores::in_memory();
        let indexer = Indexer::new(
            Chunker::new(ChunkerConfig::new(40, 0)).unwrap(),
            TreeBuilder::default(),
            Arc::new(ShortEmbedder),
            Arc::new(PatternExtractor::default()),
            stores.clone(),
        );

        let err = indexer.ingest_parsed(paris_document(), "cities.md").await.unwrap_err();
        assert!(matches!(err, Error::CollaboratorUnavailable { ref operation, .. } if operation == "embed chunks"));
        assert_eq!(stores.chunks.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_finite_vectors_are_rejected() {
        let stores = Stores::in_memory();
        let indexer = Indexer::new(
            Chunker::new(ChunkerConfig::new(40, 0)).unwrap(),
            TreeBuilder::default(),
            Arc::new(NanEmbedder),
            Arc::new(PatternExtractor::default()),
            stores.clone(),
        );

        let err = indexer.ingest_parsed(paris_document(), "cities.md").await.unwrap_err();
        assert!(matches!(err, Error::CollaboratorUnavailable { ref operation, .. } if operation == "embed chunks"));
        assert_eq!(stores.chunks.count().await.unwrap(), 0);
        assert!(stores.metadata.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_clears_all_stores() {
        let stores = Stores::in_memory();
        let indexer = indexer_with(stores.clone(), 40);
        let keep = indexer.ingest_parsed(paris_document(), "a.md").await.unwrap();
        let gone = indexer.ingest_parsed(paris_document(), "b.md").await.unwrap();

        assert!(indexer.delete_document(&gone.doc_id).await.unwrap());
        assert!(!indexer.delete_document(&gone.doc_id).await.unwrap());

        let stats = indexer.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunk_vectors, keep.chunk_count);
        assert_eq!(stats.tree_vectors, keep.tree_nodes);
        assert!(
            stores
                .metadata
                .related_entities("Paris", Some(&gone.doc_id), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_ingest_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Paris is nice.\n\nBerlin is far from Paris.").unwrap();

        let indexer = indexer_with(Stores::in_memory(), 1024);
        let report = indexer.ingest_file(&path).await.unwrap();
        assert_eq!(report.filename, "notes.txt");
        assert_eq!(report.metadata["format"], "txt");

        let err = indexer.ingest_file(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = indexer.ingest_file(&dir.path().join("scan.pdf")).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_ingest_directory_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Paris is nice").unwrap();
        std::fs::write(dir.path().join("b.md"), "   ").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "binary").unwrap();

        let report = indexer_with(Stores::in_memory(), 1024)
            .ingest_directory(dir.path())
            .await
            .unwrap();

        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("b.md"));
    }
}
