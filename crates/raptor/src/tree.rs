//! Two-level retrieval tree over a document's chunks.
//!
//! Level 0 mirrors the chunks one to one. Level 1 holds one node per k-means
//! cluster of the chunk embeddings; its text is the member chunk closest to
//! the cluster centroid rather than a generated summary.

use serde::{Deserialize, Serialize};

use ingest::{Chunk, chunk_id};

use crate::kmeans::{KMeans, nearest};

pub const LEAF_LEVEL: u8 = 0;
pub const CLUSTER_LEVEL: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNodeMetadata {
    pub doc_id: String,
    pub level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub represents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub text: String,
    pub chunk_id: String,
    pub metadata: TreeNodeMetadata,
    /// Index of the chunk whose embedding stands for this node.
    #[serde(skip)]
    pub source_chunk: usize,
}

impl TreeNode {
    pub fn level(&self) -> u8 {
        self.metadata.level
    }
}

#[derive(Debug, Clone)]
pub struct TreeBuilder {
    n_clusters: usize,
    seed: u64,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            seed: 42,
        }
    }
}

impl TreeBuilder {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    /// Cluster assignments depend on the seed and on the embedding model, so
    /// a new model version can reshape level 1 for the same text.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// `embeddings[i]` must be the vector of `chunks[i]`; extra entries on
    /// either side are ignored.
    pub fn build(&self, chunks: &[Chunk], embeddings: &[Vec<f32>], doc_id: &str) -> Vec<TreeNode> {
        let n = chunks.len().min(embeddings.len());
        let mut nodes: Vec<TreeNode> = chunks[..n]
            .iter()
            .enumerate()
            .map(|(i, chunk)| TreeNode {
                text: chunk.text.clone(),
                chunk_id: chunk.storage_id(doc_id),
                metadata: TreeNodeMetadata {
                    doc_id: doc_id.to_string(),
                    level: LEAF_LEVEL,
                    chunk_index: Some(chunk.chunk_index),
                    represents: Vec::new(),
                },
                source_chunk: i,
            })
            .collect();

        if n <= self.n_clusters {
            return nodes;
        }

        let Some(fit) = KMeans::new(self.n_clusters.min(n))
            .with_seed(self.seed)
            .fit(&embeddings[..n])
        else {
            return nodes;
        };

        for (cluster, centroid) in fit.centroids.iter().enumerate() {
            let members = fit.members(cluster);
            if members.is_empty() {
                continue;
            }

            let member_vectors: Vec<Vec<f64>> = members
                .iter()
                .map(|&i| embeddings[i].iter().map(|&x| f64::from(x)).collect())
                .collect();
            let (closest, _) = nearest(centroid, &member_vectors);
            let representative = members[closest];

            nodes.push(TreeNode {
                text: chunks[representative].text.clone(),
                chunk_id: format!("{doc_id}_L1_{cluster}"),
                metadata: TreeNodeMetadata {
                    doc_id: doc_id.to_string(),
                    level: CLUSTER_LEVEL,
                    chunk_index: None,
                    represents: members
                        .iter()
                        .map(|&i| chunk_id(doc_id, chunks[i].chunk_index))
                        .collect(),
                },
                source_chunk: representative,
            });
        }

        tracing::debug!(
            doc_id,
            leaves = n,
            clusters = nodes.len() - n,
            inertia = fit.inertia,
            "Built retrieval tree"
        );

        nodes
    }
}
