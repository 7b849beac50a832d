use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use index::{RetrievalResult, RetryPolicy};

/// Returned instead of an answer when no model endpoint is configured.
pub const UNCONFIGURED_ANSWER: &str = "Configure an LLM endpoint to generate answers.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Numbered context blocks, `[1] text`, separated by `---` rules.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say so. \
         Cite the numbered blocks you used.\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Answer:"
    )
}

#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Optional answer model behind an Ollama-compatible `/api/generate`.
#[derive(Clone)]
pub struct AnswerGenerator {
    endpoint: Option<LlmEndpoint>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(endpoint: Option<LlmEndpoint>) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn unconfigured() -> Self {
        Self::new(None)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(UNCONFIGURED_ANSWER.to_string());
        };

        let prompt = build_prompt(query, context);
        let url = format!("{}/api/generate", endpoint.base_url.trim_end_matches('/'));

        let answer = self
            .retry
            .retry("generate answer", || async {
                let response = self
                    .client
                    .post(&url)
                    .json(&OllamaRequest {
                        model: &endpoint.model,
                        prompt: &prompt,
                        stream: false,
                    })
                    .send()
                    .await
                    .context("Failed to send request to answer model")?;

                if !response.status().is_success() {
                    anyhow::bail!("Answer model request failed: {}", response.status());
                }

                let parsed: OllamaResponse = response
                    .json()
                    .await
                    .context("Failed to parse answer model response")?;
                Ok::<_, anyhow::Error>(parsed.response)
            })
            .await?;

        tracing::debug!(model = %endpoint.model, chars = answer.len(), "Generated answer");
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::Metadata;

    fn result(text: &str) -> RetrievalResult {
        RetrievalResult::new(format!("id-{}", text.len()), text, Metadata::new())
    }

    #[test]
    fn test_build_context_numbers_blocks() {
        let context = build_context(&[result("Paris is nice"), result("Berlin is far")]);
        assert_eq!(context, "[1] Paris is nice\n\n---\n\n[2] Berlin is far");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_prompt_contains_query_and_context() {
        let prompt = build_prompt("Where is Paris?", "[1] Paris is in France");
        assert!(prompt.contains("Question: Where is Paris?"));
        assert!(prompt.contains("[1] Paris is in France"));
    }

    #[tokio::test]
    async fn test_unconfigured_returns_placeholder() {
        let generator = AnswerGenerator::unconfigured();
        assert!(!generator.is_configured());
        let answer = generator.generate("anything", "[1] text").await.unwrap();
        assert_eq!(answer, UNCONFIGURED_ANSWER);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let generator = AnswerGenerator::new(Some(LlmEndpoint {
            base_url: "http://127.0.0.1:9".to_string(),
            model: "llama3".to_string(),
        }))
        .with_retry(RetryPolicy::none());

        assert!(generator.generate("q", "c").await.is_err());
    }
}
