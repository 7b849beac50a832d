pub mod extractor;
pub mod graph;
pub mod language;
pub mod normalizer;

pub use extractor::{EntityExtractor, PatternExtractor, PatternExtractorConfig};
pub use graph::{CooccurrenceGraph, EdgeKey, EntityChunkIndex, GraphBuilder, GraphEdge};
pub use language::{Language, detect_language};
pub use normalizer::{EntityNormalizer, strip_diacritics};
