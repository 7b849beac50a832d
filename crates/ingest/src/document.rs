use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form metadata attached to documents and chunks.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Heading,
    Paragraph,
}

/// One structural element of a parsed document, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub level: u32,
    pub text: String,
}

impl Block {
    pub fn heading(level: u32, text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading,
            level,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            level: 0,
            text: text.into(),
        }
    }

    pub fn is_heading(&self) -> bool {
        self.kind == BlockKind::Heading
    }
}

/// Output of a parser: raw text plus optional structure hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub text: String,
    #[serde(default)]
    pub structure: Option<Vec<Block>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ParsedDocument {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structure: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_structure(mut self, structure: Vec<Block>) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Structure blocks, treating an empty list the same as no structure.
    pub fn blocks(&self) -> Option<&[Block]> {
        self.structure.as_deref().filter(|blocks| !blocks.is_empty())
    }

    pub fn format(&self) -> &str {
        self.metadata
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }
}

/// Paragraphs separated by blank lines, trimmed, empties dropped.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
