use serde::{Deserialize, Serialize};

use crate::document::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(text: String, chunk_index: usize, metadata: Metadata) -> Self {
        Self {
            text,
            chunk_index,
            metadata,
        }
    }

    /// Storage identity of this chunk within `doc_id`.
    pub fn storage_id(&self, doc_id: &str) -> String {
        chunk_id(doc_id, self.chunk_index)
    }
}

pub fn chunk_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{doc_id}_{chunk_index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_id() {
        let chunk = Chunk::new("text".to_string(), 3, Metadata::new());
        assert_eq!(chunk.storage_id("doc"), "doc_3");
    }
}
