//! Nearest-neighbour index contract and the in-memory implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use ingest::Metadata;

use crate::result::RetrievalResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// Conjunction of metadata equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, serde_json::Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.insert(key.to_string(), value.into());
        self
    }

    pub fn doc(doc_id: &str) -> Self {
        Self::new().eq("doc_id", doc_id)
    }

    /// `Filter::doc` when a document is given, no filter otherwise.
    pub fn for_doc(doc_id: Option<&str>) -> Option<Self> {
        doc_id.map(Self::doc)
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace records by id.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `k` records ordered by ascending distance.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievalResult>>;

    /// Records for `ids` in request order; unknown ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<RetrievalResult>>;

    /// Returns how many records were removed.
    async fn delete(&self, filter: &Filter) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// Brute-force cosine index. Ties on distance keep insertion order.
#[derive(Clone, Default)]
pub struct MemoryVectorIndex {
    name: String,
    records: Arc<RwLock<Vec<VectorRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn to_result(record: &VectorRecord) -> RetrievalResult {
    RetrievalResult::new(record.id.clone(), record.text.clone(), record.metadata.clone())
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut store = self.records.write().await;
        let added = records.len();
        for record in records {
            match store.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => store.push(record),
            }
        }
        tracing::debug!(index = %self.name, added, "Upserted vectors");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievalResult>> {
        let store = self.records.read().await;
        let mut scored: Vec<(f32, &VectorRecord)> = store
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| (1.0 - cosine_similarity(vector, &r.vector), r))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, record)| to_result(record).with_distance(distance))
            .collect())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<RetrievalResult>> {
        let store = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| store.iter().find(|r| &r.id == id))
            .map(to_result)
            .collect())
    }

    async fn delete(&self, filter: &Filter) -> Result<usize> {
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|r| !filter.matches(&r.metadata));
        Ok(before - store.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc: &str, vector: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".to_string(), doc.into());
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text of {id}"),
            metadata,
        }
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".to_string(), "a".into());
        metadata.insert("raptor_level".to_string(), 1.into());

        assert!(Filter::doc("a").matches(&metadata));
        assert!(Filter::doc("a").eq("raptor_level", 1).matches(&metadata));
        assert!(!Filter::doc("a").eq("raptor_level", 0).matches(&metadata));
        assert!(!Filter::doc("b").matches(&metadata));
        assert!(Filter::new().matches(&metadata));
        assert!(Filter::for_doc(None).is_none());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = MemoryVectorIndex::new("chunks");
        assert!(index.query(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_filters() {
        let index = MemoryVectorIndex::new("chunks");
        index
            .add(vec![
                record("a_0", "a", vec![1.0, 0.0]),
                record("a_1", "a", vec![0.0, 1.0]),
                record("b_0", "b", vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["a_0", "b_0"]);
        assert!(hits[0].distance.unwrap() < hits[1].distance.unwrap());

        let hits = index.query(&[1.0, 0.0], 5, Some(&Filter::doc("a"))).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.doc_id() == Some("a")));
    }

    #[tokio::test]
    async fn test_get_keeps_request_order_and_skips_unknown() {
        let index = MemoryVectorIndex::new("chunks");
        index
            .add(vec![record("x", "d", vec![1.0]), record("y", "d", vec![1.0])])
            .await
            .unwrap();

        let hits = index
            .get(&["y".to_string(), "missing".to_string(), "x".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["y", "x"]);
        assert!(hits[0].distance.is_none());
    }

    #[tokio::test]
    async fn test_add_replaces_and_delete_by_doc() {
        let index = MemoryVectorIndex::new("chunks");
        index.add(vec![record("a_0", "a", vec![1.0])]).await.unwrap();
        index
            .add(vec![record("a_0", "a", vec![0.5]), record("b_0", "b", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        assert_eq!(index.delete(&Filter::doc("a")).await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.delete(&Filter::doc("a")).await.unwrap(), 0);
    }
}
