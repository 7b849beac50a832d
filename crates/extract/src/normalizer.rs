use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Maps surface forms of an entity to its graph key.
///
/// Only identity is affected: stored chunk text keeps its diacritics.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityNormalizer;

impl EntityNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize entity name: strip diacritics, trim, collapse whitespace.
    pub fn normalize(&self, name: &str) -> String {
        let stripped = strip_diacritics(name);
        WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
    }
}

/// Remove combining marks (Latin accents, Arabic harakat) after canonical
/// decomposition, then recompose what remains.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|&c| !is_combining_mark(c))
        .nfc()
        .collect()
}
