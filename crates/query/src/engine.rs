//! Multi-mode retrieval: vector, graph expansion, tree levels and hybrid,
//! fused with RRF.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use extract::EntityExtractor;
use index::{Embedder, Error, Filter, Result, RetrievalResult, Stores};

use crate::fusion::{RRF_K, deduplicate, fuse_top_k};
use crate::mode::{RetrievalMode, resolve};

/// Tree levels searched by raptor mode, coarsest first.
const TREE_LEVELS: [u8; 2] = [1, 0];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rrf_k: f64,
    /// Candidate lists fetch `max(top_k * factor, floor)` results.
    pub over_fetch_factor: usize,
    pub over_fetch_floor: usize,
    pub max_seed_entities: usize,
    pub related_per_entity: usize,
    pub max_related_entities: usize,
    pub chunks_per_entity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            rrf_k: RRF_K,
            over_fetch_factor: 2,
            over_fetch_floor: 10,
            max_seed_entities: 8,
            related_per_entity: 3,
            max_related_entities: 5,
            chunks_per_entity: 5,
        }
    }
}

impl RetrievalConfig {
    pub fn over_fetch(&self, top_k: usize) -> usize {
        (top_k * self.over_fetch_factor).max(self.over_fetch_floor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoDocumentsIndexed,
    QueryMatchedNothing,
}

/// What a retrieval did, for logs and API callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    pub mode: RetrievalMode,
    /// True when the mode came from keyword routing.
    pub routed: bool,
    /// Vector hits seen before fusion, summed over both legs in hybrid mode.
    pub candidates: usize,
    pub seed_entities: Vec<String>,
    pub related_entities: Vec<String>,
    pub expanded: usize,
    /// Tree levels that produced hits.
    pub tree_levels: Vec<u8>,
    /// Raptor mode found nothing in the tree and used vector search.
    pub fell_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_reason: Option<EmptyReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub trace: RetrievalTrace,
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    stores: Stores,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        stores: Stores,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            extractor,
            stores,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(
        &self,
        query: &str,
        mode: Option<RetrievalMode>,
        top_k: usize,
        doc_id: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        Ok(self
            .retrieve_with_trace(query, mode, top_k, doc_id)
            .await?
            .results)
    }

    /// At most `top_k` de-duplicated results. Expansion and tree failures
    /// degrade; only the query embedding and the base vector search fail the
    /// call.
    pub async fn retrieve_with_trace(
        &self,
        query: &str,
        mode: Option<RetrievalMode>,
        top_k: usize,
        doc_id: Option<&str>,
    ) -> Result<Retrieval> {
        let (mode, routed) = resolve(mode, query);
        let mut trace = RetrievalTrace {
            mode,
            routed,
            ..Default::default()
        };

        if top_k == 0 {
            return Ok(Retrieval {
                results: Vec::new(),
                trace,
            });
        }

        let vector = self
            .embedder
            .encode_one(query)
            .await
            .map_err(|e| Error::collaborator("embed query", e))?;

        let results = match mode {
            RetrievalMode::Vector => {
                self.plain_search(&vector, top_k, doc_id, &mut trace).await?
            }
            RetrievalMode::Graph => {
                self.graph_search(query, &vector, top_k, doc_id, &mut trace)
                    .await?
            }
            RetrievalMode::Raptor => {
                self.raptor_search(&vector, top_k, doc_id, &mut trace)
                    .await?
            }
            RetrievalMode::Hybrid => {
                let over_fetch = self.config.over_fetch(top_k);
                let vector_hits = self.vector_search(&vector, over_fetch, doc_id).await?;
                trace.candidates = vector_hits.len();
                let graph_hits = self
                    .graph_search(query, &vector, over_fetch, doc_id, &mut trace)
                    .await?;
                fuse_top_k(&[vector_hits, graph_hits], self.config.rrf_k, top_k)
            }
        };

        if results.is_empty() {
            trace.empty_reason = Some(self.explain_empty(doc_id).await);
        }

        tracing::debug!(
            mode = %mode,
            routed,
            results = results.len(),
            candidates = trace.candidates,
            expanded = trace.expanded,
            "Retrieved"
        );

        Ok(Retrieval { results, trace })
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        k: usize,
        doc_id: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        let filter = Filter::for_doc(doc_id);
        self.stores
            .chunks
            .query(vector, k, filter.as_ref())
            .await
            .map_err(|e| Error::collaborator("vector search", e))
    }

    /// Nearest neighbours as ranked by the index, de-duplicated.
    async fn plain_search(
        &self,
        vector: &[f32],
        top_k: usize,
        doc_id: Option<&str>,
        trace: &mut RetrievalTrace,
    ) -> Result<Vec<RetrievalResult>> {
        let hits = self.vector_search(vector, top_k, doc_id).await?;
        trace.candidates = hits.len();
        let mut results = deduplicate(hits);
        results.truncate(top_k);
        Ok(results)
    }

    async fn graph_search(
        &self,
        query: &str,
        vector: &[f32],
        top_k: usize,
        doc_id: Option<&str>,
        trace: &mut RetrievalTrace,
    ) -> Result<Vec<RetrievalResult>> {
        let candidates = self
            .vector_search(vector, self.config.over_fetch(top_k), doc_id)
            .await?;
        trace.candidates += candidates.len();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let seeds = self.seed_entities(query, &candidates);
        let related = self.related_entities(&seeds, doc_id).await;
        let expanded = self.expand(&related, doc_id).await;

        trace.seed_entities = seeds;
        trace.related_entities = related;
        trace.expanded = expanded.len();

        Ok(fuse_top_k(&[candidates, expanded], self.config.rrf_k, top_k))
    }

    /// Query entities first, then entities from the candidate texts.
    fn seed_entities(&self, query: &str, candidates: &[RetrievalResult]) -> Vec<String> {
        let candidate_text = candidates
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let entities_in = |text: &str| {
            let lang = self.extractor.detect_language(text);
            self.extractor.extract_entities(text, &lang)
        };

        let mut seen = HashSet::new();
        entities_in(query)
            .into_iter()
            .chain(entities_in(&candidate_text))
            .filter(|e| e.chars().count() > 1)
            .filter(|e| seen.insert(e.clone()))
            .take(self.config.max_seed_entities)
            .collect()
    }

    async fn related_entities(&self, seeds: &[String], doc_id: Option<&str>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for seed in seeds {
            match self
                .stores
                .metadata
                .related_entities(seed, doc_id, self.config.related_per_entity)
                .await
            {
                Ok(neighbours) => related.extend(
                    neighbours
                        .into_iter()
                        .map(|n| n.entity)
                        .filter(|e| seen.insert(e.clone())),
                ),
                Err(e) => {
                    tracing::warn!(entity = %seed, error = %e, "Graph lookup failed, skipping entity");
                }
            }
        }

        related.truncate(self.config.max_related_entities);
        related
    }

    async fn expand(&self, related: &[String], doc_id: Option<&str>) -> Vec<RetrievalResult> {
        let mut seen = HashSet::new();
        let mut chunk_ids = Vec::new();

        for entity in related {
            match self
                .stores
                .metadata
                .chunk_ids_for_entities(
                    std::slice::from_ref(entity),
                    doc_id,
                    self.config.chunks_per_entity,
                )
                .await
            {
                Ok(ids) => chunk_ids.extend(ids.into_iter().filter(|id| seen.insert(id.clone()))),
                Err(e) => {
                    tracing::warn!(entity = %entity, error = %e, "Entity chunk lookup failed");
                }
            }
        }

        if chunk_ids.is_empty() {
            return Vec::new();
        }

        self.stores.chunks.get(&chunk_ids).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Fetching expanded chunks failed");
            Vec::new()
        })
    }

    async fn raptor_search(
        &self,
        vector: &[f32],
        top_k: usize,
        doc_id: Option<&str>,
        trace: &mut RetrievalTrace,
    ) -> Result<Vec<RetrievalResult>> {
        let over_fetch = self.config.over_fetch(top_k);
        let mut levels = Vec::new();

        for level in TREE_LEVELS {
            let mut filter = Filter::new().eq("raptor_level", u64::from(level));
            if let Some(doc_id) = doc_id {
                filter = filter.eq("doc_id", doc_id);
            }

            match self.stores.tree.query(vector, over_fetch, Some(&filter)).await {
                Ok(hits) if !hits.is_empty() => {
                    trace.tree_levels.push(level);
                    levels.push(hits);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(level, error = %e, "Tree level search failed, skipping");
                }
            }
        }

        if levels.is_empty() {
            tracing::debug!("No tree hits, falling back to vector search");
            trace.fell_back = true;
            return self.plain_search(vector, top_k, doc_id, trace).await;
        }

        trace.candidates = levels.iter().map(Vec::len).sum();
        Ok(fuse_top_k(&levels, self.config.rrf_k, top_k))
    }

    async fn explain_empty(&self, doc_id: Option<&str>) -> EmptyReason {
        let indexed = match doc_id {
            Some(doc_id) => self
                .stores
                .metadata
                .get_document(doc_id)
                .await
                .map(|d| d.is_some()),
            None => self.stores.chunks.count().await.map(|n| n > 0),
        };

        match indexed {
            Ok(false) => {
                tracing::info!(doc_id = ?doc_id, "Empty result: no documents indexed");
                EmptyReason::NoDocumentsIndexed
            }
            Ok(true) => {
                tracing::info!(doc_id = ?doc_id, "Empty result: query matched nothing");
                EmptyReason::QueryMatchedNothing
            }
            Err(e) => {
                tracing::warn!(error = %e, "Empty result: could not check index contents");
                EmptyReason::QueryMatchedNothing
            }
        }
    }
}
