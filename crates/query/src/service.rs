//! Retrieve, then answer from the retrieved context.

use serde::Serialize;

use index::{Error, Result};

use crate::engine::{RetrievalEngine, RetrievalTrace};
use crate::llm::{AnswerGenerator, build_context};
use crate::mode::RetrievalMode;

/// Characters of source text returned alongside an answer.
pub const SOURCE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub context: String,
    pub trace: RetrievalTrace,
}

pub struct QueryService {
    engine: RetrievalEngine,
    generator: AnswerGenerator,
}

impl QueryService {
    pub fn new(engine: RetrievalEngine, generator: AnswerGenerator) -> Self {
        Self { engine, generator }
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    pub async fn answer(
        &self,
        query: &str,
        mode: Option<RetrievalMode>,
        top_k: usize,
        doc_id: Option<&str>,
    ) -> Result<Answer> {
        let retrieval = self
            .engine
            .retrieve_with_trace(query, mode, top_k, doc_id)
            .await?;
        let context = build_context(&retrieval.results);

        let answer = self
            .generator
            .generate(query, &context)
            .await
            .map_err(|e| Error::collaborator("generate answer", e))?;

        let sources = retrieval
            .results
            .iter()
            .map(|r| Source {
                id: r.id.clone(),
                text: r.text.chars().take(SOURCE_PREVIEW_CHARS).collect(),
            })
            .collect();

        Ok(Answer {
            answer,
            sources,
            context,
            trace: retrieval.trace,
        })
    }
}
