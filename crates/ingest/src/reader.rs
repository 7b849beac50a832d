use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

use crate::document::{Block, Metadata, ParsedDocument, split_paragraphs};
use crate::error::ReadError;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

pub struct DocumentReader;

impl DocumentReader {
    pub fn is_supported(path: &Path) -> bool {
        SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
    }

    pub async fn read(path: &Path) -> Result<ParsedDocument, ReadError> {
        let extension = extension_of(path);

        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ReadError::UnsupportedFormat {
                extension,
                supported: SUPPORTED_EXTENSIONS.join(", "),
            });
        }
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(ReadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await.map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let structure = match extension.as_str() {
            "md" => parse_markdown(&content),
            _ => split_paragraphs(&content)
                .into_iter()
                .map(Block::paragraph)
                .collect(),
        };

        let paragraph_count = structure.iter().filter(|b| !b.is_heading()).count();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), path.to_string_lossy().into_owned().into());
        metadata.insert("filename".to_string(), file_name(path).into());
        metadata.insert("format".to_string(), extension.into());
        metadata.insert("paragraph_count".to_string(), paragraph_count.into());

        tracing::debug!(
            path = %path.display(),
            blocks = structure.len(),
            "Parsed document"
        );

        Ok(ParsedDocument {
            text: content,
            structure: Some(structure),
            metadata,
        })
    }

    /// Read every supported file below `dir`, recursively, in path order.
    pub async fn read_directory(dir: &Path) -> Result<Vec<(String, ParsedDocument)>, ReadError> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Err(ReadError::NotFound(dir.to_path_buf()));
        }

        let paths: Vec<_> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| Self::is_supported(path))
            .collect();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = Self::read(&path).await?;
            documents.push((path.to_string_lossy().into_owned(), parsed));
        }

        Ok(documents)
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// ATX headings become heading blocks; everything between them is split
/// into paragraphs on blank lines.
fn parse_markdown(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut section = String::new();

    for line in content.lines() {
        if let Some((level, title)) = atx_heading(line) {
            push_paragraphs(&mut blocks, &section);
            section.clear();
            blocks.push(Block::heading(level, title));
            continue;
        }
        section.push_str(line);
        section.push('\n');
    }
    push_paragraphs(&mut blocks, &section);

    blocks
}

fn push_paragraphs(blocks: &mut Vec<Block>, section: &str) {
    blocks.extend(split_paragraphs(section).into_iter().map(Block::paragraph));
}

fn atx_heading(line: &str) -> Option<(u32, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        return None;
    }
    Some((level as u32, title))
}
