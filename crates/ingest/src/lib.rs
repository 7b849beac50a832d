pub mod analyzer;
pub mod chunk;
pub mod chunker;
pub mod document;
pub mod error;
pub mod reader;

pub use analyzer::{Strategy, analyze};
pub use chunk::{Chunk, chunk_id};
pub use chunker::{Chunker, ChunkerConfig};
pub use document::{Block, BlockKind, Metadata, ParsedDocument};
pub use error::{ChunkError, ReadError};
pub use reader::DocumentReader;

/// Analyze and segment a parsed document in one step.
pub fn chunk_document(chunker: &Chunker, parsed: &ParsedDocument) -> (Strategy, Vec<Chunk>) {
    let strategy = analyze(parsed);
    let chunks = chunker.segment(parsed, strategy);
    (strategy, chunks)
}
