//! Query classifier: decides whether a query needs a knowledge lookup or a
//! structured-data lookup.
//!
//! The classifier asks the text-generation collaborator for a JSON verdict
//! and collapses it into a [`Classification`]. Malformed output never fails
//! the request: it deterministically falls back to the knowledge path so the
//! user always gets some answer.

use crate::llm::{GeminiError, TextGenerator};
use serde::{Deserialize, Serialize};

/// Reasoning attached to the deterministic fallback classification.
pub const FALLBACK_REASONING: &str = "default fallback";

/// Query category. Canonical labels are KNOWLEDGE and DATA; the verdict
/// parser also accepts the `*_QUERY` spellings used on the resolver wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Knowledge,
    Data,
}

impl Category {
    /// Category tag used on the resolver wire and in `newMessage.type`.
    pub fn query_tag(&self) -> &'static str {
        match self {
            Category::Knowledge => "KNOWLEDGE_QUERY",
            Category::Data => "DATA_QUERY",
        }
    }
}

/// Outcome of classifying one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub reasoning: String,
}

impl Classification {
    fn fallback() -> Self {
        Self {
            category: Category::Knowledge,
            reasoning: FALLBACK_REASONING.to_string(),
        }
    }
}

/// Verdict parsing result: either the model's own classification or the
/// deterministic fallback. Both collapse to a single [`Classification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierOutcome {
    Parsed(Classification),
    Fallback(Classification),
}

impl ClassifierOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ClassifierOutcome::Fallback(_))
    }

    pub fn into_classification(self) -> Classification {
        match self {
            ClassifierOutcome::Parsed(c) | ClassifierOutcome::Fallback(c) => c,
        }
    }
}

/// Classify one query. The only error is a transport failure of the model
/// call; an unparseable verdict is recovered locally via the fallback.
pub async fn classify(
    generator: &dyn TextGenerator,
    text: &str,
) -> Result<Classification, GeminiError> {
    let raw = generator.generate(&classification_prompt(text)).await?;
    let outcome = parse_verdict(&raw);
    if outcome.is_fallback() {
        log::debug!("classifier verdict not parseable, using knowledge fallback");
    }
    Ok(outcome.into_classification())
}

/// Raw verdict shape expected from the model.
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse the model's raw verdict text. Invalid JSON, a missing category, or
/// an unrecognized label all map to the deterministic fallback.
pub fn parse_verdict(raw: &str) -> ClassifierOutcome {
    let body = strip_code_fence(raw);
    let Ok(verdict) = serde_json::from_str::<Verdict>(body) else {
        return ClassifierOutcome::Fallback(Classification::fallback());
    };
    let Some(category) = verdict.category.as_deref().and_then(parse_label) else {
        return ClassifierOutcome::Fallback(Classification::fallback());
    };
    ClassifierOutcome::Parsed(Classification {
        category,
        reasoning: verdict.reasoning.unwrap_or_default(),
    })
}

/// Accepted label spellings, case-insensitive. Anything else is unrecognized.
fn parse_label(label: &str) -> Option<Category> {
    match label.trim().to_lowercase().as_str() {
        "knowledge" | "knowledge_query" => Some(Category::Knowledge),
        "data" | "data_query" => Some(Category::Data),
        _ => None,
    }
}

/// Models often wrap JSON in a markdown code fence; strip it before parsing.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Instructional template sent to the model for classification.
fn classification_prompt(text: &str) -> String {
    format!(
        r#"You are an expert query classifier for an oceanographic data system.
Your task is to categorize the user's prompt into one of two categories: "KNOWLEDGE" or "DATA".

Return your answer in JSON format with two keys: "category" and "reasoning".

## Categories:

1. **KNOWLEDGE**: the user asks for a definition, an explanation, or a general factual question that can be answered from stored documents or general knowledge.
   * Example: "What is a BGC Argo float?"
   * Example: "Explain what salinity is."
   * Example: "Who manages the Argo program?"

2. **DATA**: the user asks for specific, quantifiable data points, trends, comparisons, or visualizations that must be retrieved by querying a structured database.
   * Example: "Show me temperature profiles in the Indian Ocean in May 2024."
   * Example: "Compare the salinity in the Arabian Sea vs. the Bay of Bengal."
   * Example: "What is the trajectory of float 12345?"

## User prompt to categorize:
{text}

## Your JSON response:
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedGenerator(String);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GeminiError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn valid_verdict_is_parsed() {
        let outcome = parse_verdict(r#"{"category":"DATA","reasoning":"asks for measurements"}"#);
        assert!(!outcome.is_fallback());
        let c = outcome.into_classification();
        assert_eq!(c.category, Category::Data);
        assert_eq!(c.reasoning, "asks for measurements");
    }

    #[test]
    fn label_aliases_are_accepted() {
        for label in ["knowledge", "KNOWLEDGE", "KNOWLEDGE_QUERY", "Knowledge"] {
            let raw = format!(r#"{{"category":"{label}","reasoning":"x"}}"#);
            assert_eq!(
                parse_verdict(&raw).into_classification().category,
                Category::Knowledge,
                "label {label}"
            );
        }
        for label in ["data", "DATA", "data_query", "DATA_QUERY"] {
            let raw = format!(r#"{{"category":"{label}","reasoning":"x"}}"#);
            assert_eq!(
                parse_verdict(&raw).into_classification().category,
                Category::Data,
                "label {label}"
            );
        }
    }

    #[test]
    fn invalid_json_falls_back_deterministically() {
        let outcome = parse_verdict("the model rambled instead of returning JSON");
        assert!(outcome.is_fallback());
        let c = outcome.into_classification();
        assert_eq!(c.category, Category::Knowledge);
        assert_eq!(c.reasoning, FALLBACK_REASONING);
    }

    #[test]
    fn missing_or_unknown_category_falls_back() {
        assert!(parse_verdict(r#"{"reasoning":"no category"}"#).is_fallback());
        assert!(parse_verdict(r#"{"category":"banana","reasoning":"?"}"#).is_fallback());
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"category\":\"DATA\",\"reasoning\":\"rows\"}\n```";
        let outcome = parse_verdict(raw);
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.into_classification().category, Category::Data);
    }

    #[tokio::test]
    async fn classify_always_yields_one_of_two_categories() {
        for canned in [
            r#"{"category":"DATA","reasoning":"r"}"#,
            r#"{"category":"knowledge","reasoning":"r"}"#,
            "not json at all",
            "",
        ] {
            let generator = CannedGenerator(canned.to_string());
            let c = classify(&generator, "anything").await.expect("classify");
            assert!(matches!(c.category, Category::Knowledge | Category::Data));
        }
    }

    #[test]
    fn query_tags_match_wire_spelling() {
        assert_eq!(Category::Data.query_tag(), "DATA_QUERY");
        assert_eq!(Category::Knowledge.query_tag(), "KNOWLEDGE_QUERY");
    }
}
