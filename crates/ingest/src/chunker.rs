use crate::analyzer::Strategy;
use crate::chunk::Chunk;
use crate::document::{Block, Metadata, ParsedDocument, split_paragraphs};
use crate::error::ChunkError;

/// Separator used when joining blocks into one dynamic chunk.
const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Window size for `fixed`, advisory target for `dynamic` (characters).
    pub chunk_size: usize,
    /// Characters shared by consecutive `fixed` windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 128,
        }
    }
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// The fixed window only advances when `chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `parsed` into ordered chunks. An empty result means nothing
    /// usable was extracted; the caller decides how to report that.
    pub fn segment(&self, parsed: &ParsedDocument, strategy: Strategy) -> Vec<Chunk> {
        let chunks = match strategy {
            Strategy::Fixed => self.chunk_fixed(parsed),
            Strategy::Dynamic => self.chunk_dynamic(parsed),
        };
        tracing::debug!(
            strategy = %strategy,
            chunks = chunks.len(),
            "Segmented document"
        );
        chunks
    }

    fn chunk_fixed(&self, parsed: &ParsedDocument) -> Vec<Chunk> {
        let text = parsed.text.as_str();

        // Byte offset of every char boundary, so windows are counted in chars.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;
        let step = self.config.chunk_size - self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_len {
            let end = (start + self.config.chunk_size).min(char_len);
            let window = &text[boundaries[start]..boundaries[end]];

            if !window.trim().is_empty() {
                let chunk_index = chunks.len();
                chunks.push(Chunk::new(
                    window.to_string(),
                    chunk_index,
                    chunk_metadata(&parsed.metadata, Strategy::Fixed, chunk_index),
                ));
            }

            start += step;
        }

        chunks
    }

    fn chunk_dynamic(&self, parsed: &ParsedDocument) -> Vec<Chunk> {
        let fallback: Vec<Block>;
        let blocks = match parsed.blocks() {
            Some(blocks) => blocks,
            None => {
                fallback = split_paragraphs(&parsed.text)
                    .into_iter()
                    .map(Block::paragraph)
                    .collect();
                fallback.as_slice()
            }
        };

        let target_size = self.config.chunk_size;
        let mut chunks = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut buffer_size = 0;

        for block in blocks {
            if block.text.trim().is_empty() {
                continue;
            }
            let block_size = block.text.chars().count() + BLOCK_SEPARATOR.len();

            // A heading that does not fit opens the next chunk; so does any
            // other block that would overflow the target.
            if !buffer.is_empty() && buffer_size + block_size > target_size {
                let chunk_index = chunks.len();
                chunks.push(Chunk::new(
                    buffer.join(BLOCK_SEPARATOR),
                    chunk_index,
                    chunk_metadata(&parsed.metadata, Strategy::Dynamic, chunk_index),
                ));
                buffer.clear();
                buffer_size = 0;
            }

            buffer.push(&block.text);
            buffer_size += block_size;
        }

        if !buffer.is_empty() {
            let chunk_index = chunks.len();
            chunks.push(Chunk::new(
                buffer.join(BLOCK_SEPARATOR),
                chunk_index,
                chunk_metadata(&parsed.metadata, Strategy::Dynamic, chunk_index),
            ));
        }

        chunks
    }
}

fn chunk_metadata(base: &Metadata, strategy: Strategy, chunk_index: usize) -> Metadata {
    let mut metadata = base.clone();
    metadata.insert("strategy".to_string(), strategy.as_str().into());
    metadata.insert("chunk_index".to_string(), chunk_index.into());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn test_basic_chunking() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let doc = ParsedDocument::from_text("This is a test paragraph.\n\nThis is another paragraph.")
            .with_metadata("filename", "test.txt");
        let chunks = chunker.segment(&doc, Strategy::Fixed);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].metadata["filename"], "test.txt");
        assert_eq!(chunks[0].metadata["strategy"], "fixed");
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(Chunker::new(ChunkerConfig::new(100, 100)).is_err());
        assert!(Chunker::new(ChunkerConfig::new(100, 150)).is_err());
        assert!(Chunker::new(ChunkerConfig::new(0, 0)).is_err());
        assert!(Chunker::new(ChunkerConfig::new(100, 99)).is_ok());
    }

    #[test]
    fn test_fixed_windows_reconstruct_text() {
        let text: String = (0..2500)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let (size, overlap) = (100, 20);
        let chunks = chunker(size, overlap).segment(&ParsedDocument::from_text(text.clone()), Strategy::Fixed);

        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(chunk.text.chars().count() <= size);
        }
    }

    #[test]
    fn test_fixed_counts_characters_not_bytes() {
        let text = "é".repeat(30);
        let chunks = chunker(10, 0).segment(&ParsedDocument::from_text(text), Strategy::Fixed);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.chars().count() == 10));
    }

    #[test]
    fn test_fixed_skips_whitespace_windows() {
        let text = format!("{}{}{}", "a".repeat(10), " ".repeat(30), "b".repeat(10));
        let chunks = chunker(10, 0).segment(&ParsedDocument::from_text(text), Strategy::Fixed);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a".repeat(10));
        assert_eq!(chunks[1].text, "b".repeat(10));
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let c = chunker(10, 2);
        assert!(c.segment(&ParsedDocument::from_text(""), Strategy::Fixed).is_empty());
        assert!(c.segment(&ParsedDocument::from_text("   \n\n  "), Strategy::Dynamic).is_empty());
    }

    #[test]
    fn test_dynamic_heading_starts_new_chunk() {
        let doc = ParsedDocument::from_text("").with_structure(vec![
            Block::heading(1, "Intro"),
            Block::paragraph("a".repeat(30)),
            Block::heading(1, "Details"),
            Block::paragraph("b".repeat(30)),
        ]);
        let chunks = chunker(45, 0).segment(&doc, Strategy::Dynamic);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("Intro\n\n{}", "a".repeat(30)));
        assert!(chunks[1].text.starts_with("Details"));
        assert_eq!(chunks[1].metadata["strategy"], "dynamic");
    }

    #[test]
    fn test_dynamic_merges_small_blocks() {
        let doc = ParsedDocument::from_text("one\n\ntwo\n\nthree");
        let chunks = chunker(1024, 128).segment(&doc, Strategy::Dynamic);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "one\n\ntwo\n\nthree");
    }

    #[test]
    fn test_dynamic_oversized_block_is_kept_whole() {
        let big = "x".repeat(200);
        let doc = ParsedDocument::from_text(format!("small\n\n{big}\n\ntail"));
        let chunks = chunker(50, 0).segment(&doc, Strategy::Dynamic);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, big);
        assert_eq!(chunks[2].text, "tail");
        let indexes: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_dynamic_skips_blank_blocks() {
        let doc = ParsedDocument::from_text("").with_structure(vec![
            Block::paragraph("   "),
            Block::paragraph("content"),
        ]);
        let chunks = chunker(100, 0).segment(&doc, Strategy::Dynamic);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "content");
    }

    #[test]
    fn test_dynamic_whitespace_block_between_blocks_is_dropped() {
        let doc = ParsedDocument::from_text("").with_structure(vec![
            Block::paragraph("first"),
            Block::paragraph(" \t \n"),
            Block::paragraph("second"),
        ]);
        // Counting the blank block would push "second" into its own chunk.
        let chunks = chunker(16, 0).segment(&doc, Strategy::Dynamic);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "first\n\nsecond");
    }
}
