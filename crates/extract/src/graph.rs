//! Entity co-occurrence graph for one document.
//!
//! Two entities are linked when they appear in the same chunk. Edge weight is
//! the number of chunks in which the pair co-occurs, so repeated mentions
//! inside one chunk count once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use ingest::Chunk;

use crate::extractor::EntityExtractor;

/// Entity -> ids of the chunks that mention it, in chunk order.
pub type EntityChunkIndex = BTreeMap<String, Vec<String>>;

/// Unordered entity pair stored as `(min, max)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    source: String,
    target: String,
}

impl EdgeKey {
    pub fn canonical(a: &str, b: &str) -> Self {
        let (source, target) = if a <= b { (a, b) } else { (b, a) };
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CooccurrenceGraph {
    /// Sorted by `(source, target)`.
    pub edges: Vec<GraphEdge>,
    pub entity_chunks: EntityChunkIndex,
}

impl CooccurrenceGraph {
    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        let key = EdgeKey::canonical(a, b);
        self.edges
            .iter()
            .find(|e| e.source == key.source && e.target == key.target)
            .map(|e| e.weight)
    }

    pub fn entity_count(&self) -> usize {
        self.entity_chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.entity_chunks.is_empty()
    }
}

pub struct GraphBuilder<'a> {
    extractor: &'a dyn EntityExtractor,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(extractor: &'a dyn EntityExtractor) -> Self {
        Self { extractor }
    }

    pub fn build(&self, chunks: &[Chunk], doc_id: &str) -> CooccurrenceGraph {
        let mut weights: BTreeMap<EdgeKey, f64> = BTreeMap::new();
        let mut entity_chunks = EntityChunkIndex::new();

        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                continue;
            }
            let chunk_id = chunk.storage_id(doc_id);
            let lang = self.extractor.detect_language(&chunk.text);

            // One entry per entity per chunk keeps weights per-chunk.
            let entities: BTreeSet<String> = self
                .extractor
                .extract_entities(&chunk.text, &lang)
                .into_iter()
                .filter(|e| e.chars().count() > 1)
                .collect();

            for entity in &entities {
                entity_chunks
                    .entry(entity.clone())
                    .or_default()
                    .push(chunk_id.clone());
            }

            let entities: Vec<&String> = entities.iter().collect();
            for (i, a) in entities.iter().enumerate() {
                for b in &entities[i + 1..] {
                    *weights.entry(EdgeKey::canonical(a, b)).or_insert(0.0) += 1.0;
                }
            }
        }

        let edges: Vec<GraphEdge> = weights
            .into_iter()
            .map(|(key, weight)| GraphEdge {
                source: key.source,
                target: key.target,
                weight,
            })
            .collect();

        tracing::debug!(
            doc_id,
            chunks = chunks.len(),
            edges = edges.len(),
            entities = entity_chunks.len(),
            "Built co-occurrence graph"
        );

        CooccurrenceGraph {
            edges,
            entity_chunks,
        }
    }
}
