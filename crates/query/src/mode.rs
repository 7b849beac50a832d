use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GRAPH_KEYWORDS: &[&str] = &["related", "connection", "between", "relationship", "connect"];
const SUMMARY_KEYWORDS: &[&str] = &["summarize", "overview", "main points", "summary"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Vector,
    Graph,
    Raptor,
    Hybrid,
}

impl RetrievalMode {
    pub const ALL: [RetrievalMode; 4] = [
        RetrievalMode::Vector,
        RetrievalMode::Graph,
        RetrievalMode::Raptor,
        RetrievalMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::Graph => "graph",
            RetrievalMode::Raptor => "raptor",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RetrievalMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown retrieval mode: {s}"))
    }
}

/// Keyword routing: relational wording goes to the graph, summary wording to
/// the tree, anything else to plain vector search.
pub fn route(query: &str) -> RetrievalMode {
    let q = query.to_lowercase();
    if GRAPH_KEYWORDS.iter().any(|k| q.contains(k)) {
        RetrievalMode::Graph
    } else if SUMMARY_KEYWORDS.iter().any(|k| q.contains(k)) {
        RetrievalMode::Raptor
    } else {
        RetrievalMode::Vector
    }
}

/// An explicit mode always wins. The flag says whether routing chose it.
pub fn resolve(mode: Option<RetrievalMode>, query: &str) -> (RetrievalMode, bool) {
    match mode {
        Some(mode) => (mode, false),
        None => (route(query), true),
    }
}
