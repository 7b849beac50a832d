use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::language::{self, Language};
use crate::normalizer::{EntityNormalizer, strip_diacritics};

/// Runs of capitalised words on one line ("Eiffel Tower", "José").
static CAPITALIZED_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}\p{Ll}+(?:[^\S\r\n]+\p{Lu}\p{Ll}+)*\b").expect("valid phrase pattern")
});

static ARABIC_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0600}-\x{06FF}]{2,}").expect("valid arabic word pattern"));

const ARABIC_STOPWORDS: &[&str] = &[
    "في", "من", "إلى", "على", "عن", "مع", "بـ", "ل", "ك", "و", "أو", "ف", "ثم", "لكن", "أن",
    "إن", "ال", "هذا", "هذه", "ذلك", "تلك", "هؤلاء", "أولئك", "هو", "هي", "هم", "هن", "أنت",
    "أنتم", "أنا", "نحن", "كان", "يكون", "ليس", "قد", "لم", "لن", "لا", "ما", "التي", "الذي",
    "اللذان", "اللتان", "كل", "بعض", "كيف", "لماذا", "متى", "أين", "هل", "نعم", "غير", "سوى",
    "إلا", "حتى", "منذ", "بين", "عند", "قبل", "بعد",
];

/// Stopwords compared after diacritic stripping, like the words they filter.
static NORMALIZED_STOPWORDS: LazyLock<HashSet<String>> =
    LazyLock::new(|| ARABIC_STOPWORDS.iter().map(|w| strip_diacritics(w)).collect());

/// Language detection and entity extraction used to build the graph and to
/// seed graph retrieval.
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn detect_language(&self, text: &str) -> Language {
        language::detect_language(text)
    }

    /// Normalized, de-duplicated entity keys found in `text`.
    fn extract_entities(&self, text: &str, lang: &Language) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct PatternExtractorConfig {
    pub max_entities: usize,
    pub phrase_chars: (usize, usize),
    pub arabic_word_chars: (usize, usize),
    /// Arabic words must repeat at least this often to count.
    pub arabic_min_count: usize,
    pub arabic_max_words: usize,
}

impl Default for PatternExtractorConfig {
    fn default() -> Self {
        Self {
            max_entities: 30,
            phrase_chars: (2, 80),
            arabic_word_chars: (3, 60),
            arabic_min_count: 2,
            arabic_max_words: 20,
        }
    }
}

/// Model-free extractor: capitalised phrases plus frequent Arabic words.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    config: PatternExtractorConfig,
    normalizer: EntityNormalizer,
}

impl PatternExtractor {
    pub fn new(config: PatternExtractorConfig) -> Self {
        Self {
            config,
            normalizer: EntityNormalizer::new(),
        }
    }

    fn capitalized_phrases(&self, text: &str) -> Vec<String> {
        let (min, max) = self.config.phrase_chars;
        CAPITALIZED_PHRASE
            .find_iter(text)
            .map(|m| self.normalizer.normalize(m.as_str()))
            .filter(|phrase| (min..=max).contains(&phrase.chars().count()))
            .collect()
    }

    fn frequent_arabic_words(&self, text: &str) -> Vec<String> {
        let (min, max) = self.config.arabic_word_chars;
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for m in ARABIC_WORD.find_iter(text) {
            let word = self.normalizer.normalize(m.as_str());
            if !(min..=max).contains(&word.chars().count()) || NORMALIZED_STOPWORDS.contains(&word) {
                continue;
            }
            let count = counts.entry(word.clone()).or_insert(0);
            if *count == 0 {
                order.push(word);
            }
            *count += 1;
        }

        // Most frequent first; ties keep first-seen order (stable sort).
        order.sort_by(|a, b| counts[b].cmp(&counts[a]));
        order
            .into_iter()
            .take(self.config.arabic_max_words)
            .filter(|w| counts[w] >= self.config.arabic_min_count)
            .collect()
    }
}

impl EntityExtractor for PatternExtractor {
    fn name(&self) -> &str {
        "pattern"
    }

    fn extract_entities(&self, text: &str, _lang: &Language) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        self.capitalized_phrases(text)
            .into_iter()
            .chain(self.frequent_arabic_words(text))
            .filter(|entity| seen.insert(entity.clone()))
            .take(self.config.max_entities)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<String> {
        let extractor = PatternExtractor::default();
        let lang = extractor.detect_language(text);
        extractor.extract_entities(text, &lang)
    }

    #[test]
    fn test_capitalized_phrases() {
        assert_eq!(extract("Paris has the Eiffel Tower"), vec!["Paris", "Eiffel Tower"]);
        assert_eq!(extract("Berlin is far from Paris"), vec!["Berlin", "Paris"]);
    }

    #[test]
    fn test_deduplicates_within_text() {
        assert_eq!(extract("Paris and Paris and Paris"), vec!["Paris"]);
    }

    #[test]
    fn test_phrases_do_not_cross_lines() {
        assert_eq!(extract("Introduction\n\nLondon calling"), vec!["Introduction", "London"]);
    }

    #[test]
    fn test_diacritics_merge() {
        assert_eq!(extract("José met Jose"), vec!["Jose"]);
    }

    #[test]
    fn test_single_letters_are_ignored() {
        assert!(extract("a b c I x").is_empty());
        assert!(extract("   ").is_empty());
    }

    #[test]
    fn test_arabic_words_need_repetition() {
        let text = "مكتبة كبيرة. مكتبة جديدة. في المدينة";
        assert_eq!(extract(text), vec!["مكتبة"]);
    }

    #[test]
    fn test_max_entities() {
        let extractor = PatternExtractor::new(PatternExtractorConfig {
            max_entities: 2,
            ..Default::default()
        });
        let found = extractor.extract_entities("Alpha, Beta, Gamma, Delta", &Language::English);
        assert_eq!(found, vec!["Alpha", "Beta"]);
    }
}
