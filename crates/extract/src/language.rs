use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static ARABIC_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0600}-\x{06FF}]").expect("valid arabic pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Arabic,
    Other(String),
}

impl Language {
    pub fn code(&self) -> &str {
        match self {
            Language::English => "en",
            Language::Arabic => "ar",
            Language::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            "en" => Language::English,
            "ar" => Language::Arabic,
            other => Language::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Script-based detection: any Arabic-block character means Arabic,
/// everything else is treated as English.
pub fn detect_language(text: &str) -> Language {
    if ARABIC_SCRIPT.is_match(text) {
        Language::Arabic
    } else {
        Language::English
    }
}
