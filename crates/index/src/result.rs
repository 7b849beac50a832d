use serde::{Deserialize, Serialize};

use ingest::Metadata;

/// One ranked hit from a vector index, the graph expansion, or a fusion of
/// several lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Index-native distance, lower is closer. Absent for id lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    /// Fused score, higher is better. Set only by rank fusion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RetrievalResult {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            metadata,
            distance: None,
            score: None,
        }
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get("doc_id").and_then(|v| v.as_str())
    }

    /// The id, or the first `prefix_chars` characters of the text when the
    /// result has no id.
    pub fn identity(&self, prefix_chars: usize) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.text.chars().take(prefix_chars).collect(),
        }
    }
}
