//! Document/chunk records plus the per-document co-occurrence graph.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use extract::{EntityChunkIndex, GraphEdge};
use ingest::Metadata;

/// Characters of chunk text kept in a [`ChunkRecord`].
pub const TEXT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub strategy: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub text_preview: String,
    pub metadata: Metadata,
}

impl ChunkRecord {
    pub fn new(doc_id: &str, chunk: &ingest::Chunk) -> Self {
        Self {
            id: chunk.storage_id(doc_id),
            doc_id: doc_id.to_string(),
            chunk_index: chunk.chunk_index,
            text_preview: chunk.text.chars().take(TEXT_PREVIEW_CHARS).collect(),
            metadata: chunk.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub document: DocumentRecord,
    /// Ordered by `chunk_index`.
    pub chunks: Vec<ChunkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity: String,
    pub weight: f64,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn add_document(&self, document: &DocumentRecord, chunks: &[ChunkRecord]) -> Result<()>;

    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentDetail>>;

    /// Newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// Removes the document, its chunks, edges and entity-chunk rows.
    /// Returns whether the document existed.
    async fn delete_document(&self, doc_id: &str) -> Result<bool>;

    async fn add_graph(
        &self,
        doc_id: &str,
        edges: &[GraphEdge],
        entity_chunks: &EntityChunkIndex,
    ) -> Result<()>;

    /// Neighbours of `entity` over edges in either direction, heaviest first,
    /// never including `entity` itself.
    async fn related_entities(
        &self,
        entity: &str,
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>>;

    /// Distinct ids of chunks mentioning any of `entities`, at most `limit`
    /// rows considered.
    async fn chunk_ids_for_entities(
        &self,
        entities: &[String],
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>>;

    async fn document_count(&self) -> Result<usize>;
}

/// Merge both edge directions: each side is already limited and sorted,
/// the union is re-sorted by weight and truncated again.
pub fn merge_neighbours(
    entity: &str,
    outgoing: Vec<RelatedEntity>,
    incoming: Vec<RelatedEntity>,
    limit: usize,
) -> Vec<RelatedEntity> {
    let mut seen: HashSet<String> = HashSet::from([entity.to_string()]);
    let mut merged: Vec<RelatedEntity> = Vec::new();
    for related in outgoing.into_iter().chain(incoming) {
        if seen.insert(related.entity.clone()) {
            merged.push(related);
        }
    }
    merged.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    merged.truncate(limit);
    merged
}

#[derive(Debug, Clone)]
struct StoredEdge {
    doc_id: String,
    edge: GraphEdge,
}

#[derive(Debug, Clone)]
struct EntityChunkRow {
    doc_id: String,
    entity: String,
    chunk_id: String,
}

#[derive(Default)]
struct Tables {
    documents: BTreeMap<String, DocumentRecord>,
    chunks: Vec<ChunkRecord>,
    edges: Vec<StoredEdge>,
    entity_chunks: Vec<EntityChunkRow>,
}

#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_scope(row_doc: &str, doc_id: Option<&str>) -> bool {
    doc_id.is_none_or(|d| d == row_doc)
}

fn neighbours<'a>(
    edges: impl Iterator<Item = (&'a str, f64)>,
    limit: usize,
) -> Vec<RelatedEntity> {
    let mut found: Vec<RelatedEntity> = edges
        .map(|(entity, weight)| RelatedEntity {
            entity: entity.to_string(),
            weight,
        })
        .collect();
    found.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    // Same pair in several documents: keep the heaviest edge only.
    let mut seen = HashSet::new();
    found.retain(|r| seen.insert(r.entity.clone()));
    found.truncate(limit);
    found
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn add_document(&self, document: &DocumentRecord, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.documents.insert(document.id.clone(), document.clone());
        tables.chunks.retain(|c| c.doc_id != document.id);
        tables.chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentDetail>> {
        let tables = self.tables.read().await;
        let Some(document) = tables.documents.get(doc_id) else {
            return Ok(None);
        };
        let mut chunks: Vec<ChunkRecord> = tables
            .chunks
            .iter()
            .filter(|c| c.doc_id == doc_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(Some(DocumentDetail {
            document: document.clone(),
            chunks,
        }))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<DocumentRecord> = tables.documents.values().cloned().collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let existed = tables.documents.remove(doc_id).is_some();
        tables.chunks.retain(|c| c.doc_id != doc_id);
        tables.edges.retain(|e| e.doc_id != doc_id);
        tables.entity_chunks.retain(|r| r.doc_id != doc_id);
        Ok(existed)
    }

    async fn add_graph(
        &self,
        doc_id: &str,
        edges: &[GraphEdge],
        entity_chunks: &EntityChunkIndex,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.edges.extend(edges.iter().map(|edge| StoredEdge {
            doc_id: doc_id.to_string(),
            edge: edge.clone(),
        }));
        for (entity, chunk_ids) in entity_chunks {
            tables
                .entity_chunks
                .extend(chunk_ids.iter().map(|chunk_id| EntityChunkRow {
                    doc_id: doc_id.to_string(),
                    entity: entity.clone(),
                    chunk_id: chunk_id.clone(),
                }));
        }
        Ok(())
    }

    async fn related_entities(
        &self,
        entity: &str,
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>> {
        let tables = self.tables.read().await;
        let scoped: Vec<&GraphEdge> = tables
            .edges
            .iter()
            .filter(|e| in_scope(&e.doc_id, doc_id))
            .map(|e| &e.edge)
            .collect();

        let outgoing = neighbours(
            scoped
                .iter()
                .filter(|e| e.source == entity)
                .map(|e| (e.target.as_str(), e.weight)),
            limit,
        );
        let incoming = neighbours(
            scoped
                .iter()
                .filter(|e| e.target == entity)
                .map(|e| (e.source.as_str(), e.weight)),
            limit,
        );

        Ok(merge_neighbours(entity, outgoing, incoming, limit))
    }

    async fn chunk_ids_for_entities(
        &self,
        entities: &[String],
        doc_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        let mut seen = HashSet::new();
        Ok(tables
            .entity_chunks
            .iter()
            .filter(|r| in_scope(&r.doc_id, doc_id) && entities.contains(&r.entity))
            .take(limit)
            .filter(|r| seen.insert(r.chunk_id.clone()))
            .map(|r| r.chunk_id.clone())
            .collect())
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.tables.read().await.documents.len())
    }
}
