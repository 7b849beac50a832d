//! Chunking strategy selection.
//!
//! Short documents with uniform paragraphs chunk well with a fixed window.
//! Long documents, documents with several headings, or documents whose block
//! sizes vary a lot are chunked along their structure instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::document::{ParsedDocument, split_paragraphs};

/// Documents longer than this (in characters) are always chunked dynamically.
pub const LONG_DOCUMENT_CHARS: usize = 5000;

const MAX_HEADING_CHARS: usize = 80;
const MAX_NUMBERED_HEADING_WORDS: usize = 6;
const MAX_UPPERCASE_HEADING_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Fixed,
    Dynamic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Fixed => "fixed",
            Strategy::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Strategy::Fixed),
            "dynamic" => Ok(Strategy::Dynamic),
            other => Err(format!("unknown chunking strategy: {other}")),
        }
    }
}

/// Pick a chunking strategy for `parsed`. Pure and infallible.
pub fn analyze(parsed: &ParsedDocument) -> Strategy {
    let (heading_count, block_lengths) = match parsed.blocks() {
        Some(blocks) => {
            let heading_count = blocks.iter().filter(|b| b.is_heading()).count();
            let lengths = blocks
                .iter()
                .filter(|b| !b.is_heading())
                .map(|b| b.text.chars().count())
                .collect::<Vec<_>>();
            (heading_count, lengths)
        }
        None => {
            let blocks = split_paragraphs(&parsed.text);
            let heading_count = blocks.iter().filter(|b| looks_like_heading(b)).count();
            let lengths = blocks.iter().map(|b| b.chars().count()).collect::<Vec<_>>();
            (heading_count, lengths)
        }
    };

    if heading_count >= 2 {
        return Strategy::Dynamic;
    }
    if parsed.text.chars().count() > LONG_DOCUMENT_CHARS {
        return Strategy::Dynamic;
    }
    if let Some((mean, std_dev)) = mean_and_std_dev(&block_lengths) {
        if std_dev > mean * 0.5 {
            return Strategy::Dynamic;
        }
    }

    Strategy::Fixed
}

/// Short line that is either numbered ("1. Scope") or fully upper-case.
pub fn looks_like_heading(line: &str) -> bool {
    if line.chars().count() > MAX_HEADING_CHARS {
        return false;
    }
    let stripped = line.trim();
    let Some(first) = stripped.chars().next() else {
        return false;
    };

    let words = stripped.split_whitespace().count();
    if words <= MAX_NUMBERED_HEADING_WORDS && first.is_ascii_digit() {
        return true;
    }

    is_upper_case(stripped) && stripped.chars().count() < MAX_UPPERCASE_HEADING_CHARS
}

/// At least one cased character and no lower-case ones.
fn is_upper_case(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}

/// Mean and population standard deviation; `None` for an empty sample.
fn mean_and_std_dev(values: &[usize]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    Some((mean, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;

    #[test]
    fn test_empty_document_is_fixed() {
        assert_eq!(analyze(&ParsedDocument::default()), Strategy::Fixed);
    }

    #[test]
    fn test_uniform_short_text_is_fixed() {
        let para = "word ".repeat(40);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let doc = ParsedDocument::from_text(text);
        assert_eq!(analyze(&doc), Strategy::Fixed);
        // Same input, same answer.
        assert_eq!(analyze(&doc), analyze(&doc.clone()));
    }

    #[test]
    fn test_two_headings_is_dynamic() {
        let doc = ParsedDocument::from_text("Intro\n\nBody").with_structure(vec![
            Block::heading(1, "Intro"),
            Block::paragraph("Body text"),
            Block::heading(1, "Details"),
            Block::paragraph("More body"),
        ]);
        assert_eq!(analyze(&doc), Strategy::Dynamic);
    }

    #[test]
    fn test_heading_like_lines_in_plain_text() {
        let text = "1. Scope\n\nThe scope paragraph.\n\nOVERVIEW\n\nThe overview paragraph.";
        assert_eq!(analyze(&ParsedDocument::from_text(text)), Strategy::Dynamic);
    }

    #[test]
    fn test_long_document_is_dynamic() {
        let para = "a".repeat(100);
        let text = vec![para; 60].join("\n\n");
        assert!(text.len() > LONG_DOCUMENT_CHARS);
        assert_eq!(analyze(&ParsedDocument::from_text(text)), Strategy::Dynamic);
    }

    #[test]
    fn test_high_variance_is_dynamic() {
        let text = format!("short\n\n{}", "long paragraph ".repeat(20));
        assert_eq!(analyze(&ParsedDocument::from_text(text)), Strategy::Dynamic);
    }

    #[test]
    fn test_structure_lengths_ignore_headings() {
        // One heading only, paragraphs of equal size.
        let doc = ParsedDocument::from_text("x").with_structure(vec![
            Block::heading(1, "A heading that is much longer than the paragraphs below it"),
            Block::paragraph("same size"),
            Block::paragraph("same size"),
        ]);
        assert_eq!(analyze(&doc), Strategy::Fixed);
    }

    #[test]
    fn test_looks_like_heading() {
        assert!(looks_like_heading("1. Introduction"));
        assert!(looks_like_heading("RESULTS AND DISCUSSION"));
        assert!(!looks_like_heading("1 two three four five six seven"));
        assert!(!looks_like_heading("A normal sentence."));
        assert!(!looks_like_heading(""));
        assert!(looks_like_heading("2024"));
        assert!(!looks_like_heading("½ cup of flour"));
        assert!(!looks_like_heading(&"A".repeat(81)));
    }

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("Dynamic".parse::<Strategy>().unwrap(), Strategy::Dynamic);
        assert_eq!(Strategy::Fixed.to_string(), "fixed");
        assert!("semantic".parse::<Strategy>().is_err());
    }
}
