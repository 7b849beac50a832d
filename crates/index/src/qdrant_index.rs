use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use ingest::Metadata;

use crate::result::RetrievalResult;
use crate::retry::RetryPolicy;
use crate::vector::{Filter, VectorIndex, VectorRecord};

/// Qdrant collection accessed over its REST API. Payloads carry the string
/// id, text and metadata; point ids are derived from the string id.
pub struct QdrantIndex {
    base_url: String,
    client: reqwest::Client,
    collection_name: String,
    dimension: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: u64,
    vector: Vec<f32>,
    payload: Payload,
}

#[derive(Clone, Serialize, Deserialize, Default)]
struct Payload {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Deserialize)]
struct CollectionInfo {
    result: CollectionResult,
}

#[derive(Deserialize)]
struct CollectionResult {
    collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct Collection {
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    result: Vec<StoredPoint>,
}

#[derive(Deserialize)]
struct StoredPoint {
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantIndex {
    pub fn new(base_url: String, collection_name: String, dimension: usize) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            collection_name,
            dimension,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create the collection unless it already exists.
    pub async fn init_collection(&self) -> Result<()> {
        let url = format!("{}/collections", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list collections: {}", response.status());
        }

        let info: CollectionInfo = response.json().await?;
        let exists = info
            .result
            .collections
            .iter()
            .any(|c| c.name == self.collection_name);

        if exists {
            tracing::info!(collection = %self.collection_name, "Collection already exists");
            return Ok(());
        }

        let url = format!("{}/collections/{}", self.base_url, self.collection_name);
        let create_req = CreateCollection {
            vectors: VectorParams {
                size: self.dimension,
                distance: "Cosine".to_string(),
            },
        };

        let response = self.client.put(&url).json(&create_req).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to create collection: {}", error_text);
        }

        tracing::info!(
            collection = %self.collection_name,
            dimension = self.dimension,
            "Collection created"
        );
        Ok(())
    }

    fn points_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}/points{}",
            self.base_url, self.collection_name, suffix
        )
    }

    async fn post(&self, operation: &str, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        self.retry
            .retry(operation, || async {
                let response = self.client.post(url).json(body).send().await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Qdrant {operation} failed ({status}): {error_text}");
                }
                Ok::<_, anyhow::Error>(response)
            })
            .await
    }
}

/// Stable 64-bit point id from the first eight bytes of SHA-256.
pub fn point_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Qdrant `must` filter over the nested `metadata` payload.
fn to_qdrant_filter(filter: &Filter) -> serde_json::Value {
    let must: Vec<serde_json::Value> = filter
        .conditions()
        .map(|(key, value)| json!({ "key": format!("metadata.{key}"), "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

fn to_result(payload: Payload) -> RetrievalResult {
    RetrievalResult::new(payload.id, payload.text, payload.metadata)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        &self.collection_name
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points: Vec<Point> = records
            .into_iter()
            .map(|r| Point {
                id: point_id(&r.id),
                vector: r.vector,
                payload: Payload {
                    id: r.id,
                    text: r.text,
                    metadata: r.metadata,
                },
            })
            .collect();
        let upsert_req = UpsertPoints { points };
        let url = self.points_url("?wait=true");

        self.retry
            .retry("qdrant upsert", || async {
                let response = self.client.put(&url).json(&upsert_req).send().await?;
                if !response.status().is_success() {
                    let error_text = response.text().await?;
                    anyhow::bail!("Failed to upsert points: {}", error_text);
                }
                Ok::<_, anyhow::Error>(())
            })
            .await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievalResult>> {
        let mut body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = to_qdrant_filter(filter);
        }

        let response: SearchResponse = self
            .post("search", &self.points_url("/search"), &body)
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant search response")?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let payload = p.payload.unwrap_or_default();
                to_result(payload).with_distance(1.0 - p.score)
            })
            .collect())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<RetrievalResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<u64> = ids.iter().map(|id| point_id(id)).collect();
        let body = json!({ "ids": point_ids, "with_payload": true });

        let response: RetrieveResponse = self
            .post("retrieve", &self.points_url(""), &body)
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant retrieve response")?;

        let mut by_id: HashMap<String, Payload> = response
            .result
            .into_iter()
            .filter_map(|p| p.payload)
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(to_result)
            .collect())
    }

    async fn delete(&self, filter: &Filter) -> Result<usize> {
        let before = self.count().await?;
        let body = json!({ "filter": to_qdrant_filter(filter) });
        self.post("delete", &self.points_url("/delete?wait=true"), &body)
            .await?;
        let after = self.count().await?;
        Ok(before.saturating_sub(after))
    }

    async fn count(&self) -> Result<usize> {
        let response: CountResponse = self
            .post("count", &self.points_url("/count"), &json!({ "exact": true }))
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant count response")?;
        Ok(response.result.count)
    }
}
