//! Resolver gateway: one outbound call to the data/RAG backend per query,
//! plus the knowledge-path answer step.

use crate::classifier::Category;
use crate::llm::{GeminiError, TextGenerator};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Reply from the resolver backend. `context` holds prose (knowledge) or the
/// semi-structured data-row text (data); `raw` is the verbatim response body.
#[derive(Debug, Clone)]
pub struct ResolverReply {
    pub context: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("resolver request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("resolver api error: {0}")]
    Api(String),
    #[error("answer generation failed: {0}")]
    Generation(#[from] GeminiError),
}

/// Backend that answers a classified query. Implemented by [`ResolverClient`];
/// tests swap in scripted fakes.
#[async_trait]
pub trait QueryResolver: Send + Sync {
    async fn fetch_context(
        &self,
        prompt: &str,
        category: Category,
    ) -> Result<ResolverReply, ResolverError>;
}

/// HTTP client for the resolver service (`POST {base}/query`).
#[derive(Clone)]
pub struct ResolverClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    prompt: &'a str,
    category: &'a str,
}

impl ResolverClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl QueryResolver for ResolverClient {
    /// Issue `{prompt, category}` and return the response verbatim plus the
    /// extracted `context` field. No retries; failures surface to the caller.
    async fn fetch_context(
        &self,
        prompt: &str,
        category: Category,
    ) -> Result<ResolverReply, ResolverError> {
        let url = format!("{}/query", self.base_url);
        let body = QueryRequest {
            prompt,
            category: category.query_tag(),
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ResolverError::Api(format!("{} {}", status, body)));
        }
        let raw: serde_json::Value = res.json().await?;
        let context = raw
            .get("context")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Ok(ResolverReply { context, raw })
    }
}

/// Knowledge path: ask the text generator for the final answer, grounded in
/// the retrieved context. Failure here is treated like a resolver failure.
pub async fn answer_with_context(
    generator: &dyn TextGenerator,
    question: &str,
    context: &str,
) -> Result<String, ResolverError> {
    let answer = generator.generate(&answer_prompt(question, context)).await?;
    Ok(answer)
}

/// Instructional template for the knowledge-path answer step.
fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an oceanographic data assistant. Answer the user's question
using the retrieved context below. Prefer the context over general knowledge;
if the context is empty or irrelevant, say what you know and note the gap.

## Retrieved context:
{context}

## User question:
{question}

## Your answer:
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_serializes_wire_category() {
        let body = QueryRequest {
            prompt: "show me salinity",
            category: Category::Data.query_tag(),
        };
        let s = serde_json::to_string(&body).expect("serialize");
        assert_eq!(
            s,
            r#"{"prompt":"show me salinity","category":"DATA_QUERY"}"#
        );
    }

    #[test]
    fn answer_prompt_embeds_context_and_question() {
        let p = answer_prompt("What is an Argo float?", "An Argo float is a profiling float.");
        assert!(p.contains("An Argo float is a profiling float."));
        assert!(p.contains("What is an Argo float?"));
    }
}
