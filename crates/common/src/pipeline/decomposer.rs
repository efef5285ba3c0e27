//! Query decomposition
//!
//! Splits one user query into independent sub-queries via the generation
//! capability. Decomposition failure never aborts the pipeline: any problem
//! with the call or its output degrades to the original query alone.

use crate::generation::{strip_code_fences, TextGenerator};
use crate::metrics;
use serde_json::Value;

pub struct QueryDecomposer {
    max_sub_queries: usize,
}

impl QueryDecomposer {
    pub fn new(max_sub_queries: usize) -> Self {
        Self { max_sub_queries }
    }

    /// Decompose a query. Always returns a non-empty list.
    pub async fn decompose(&self, generator: &dyn TextGenerator, query: &str) -> Vec<String> {
        let prompt = self.build_prompt(query);

        match generator.generate(&prompt).await {
            Ok(raw) => {
                metrics::record_generation("decomposition", true);
                parse_sub_queries(&raw, query, self.max_sub_queries)
            }
            Err(e) => {
                metrics::record_generation("decomposition", false);
                tracing::warn!(error = %e, "Decomposition call failed, using original query");
                vec![query.to_string()]
            }
        }
    }

    fn build_prompt(&self, query: &str) -> String {
        format!(
            "Break the following question into up to {} focused web search queries. \
            Each query should target one aspect of the question and stand on its own.\n\n\
            Question: {}\n\n\
            Respond with ONLY a JSON array of strings, no other text. \
            Example: [\"first search query\", \"second search query\"]",
            self.max_sub_queries, query
        )
    }
}

/// Parse the model's output into sub-queries, falling back to the original
/// query on anything that is not a non-empty JSON array of strings.
pub(crate) fn parse_sub_queries(raw: &str, original: &str, max: usize) -> Vec<String> {
    let fallback = || vec![original.to_string()];

    let Ok(value) = serde_json::from_str::<Value>(strip_code_fences(raw)) else {
        tracing::debug!("Decomposition output was not valid JSON");
        return fallback();
    };

    let Some(items) = value.as_array() else {
        return fallback();
    };

    let mut sub_queries = Vec::with_capacity(items.len().min(max));
    for item in items {
        let Some(text) = item.as_str() else {
            return fallback();
        };
        let text = text.trim();
        if !text.is_empty() {
            sub_queries.push(text.to_string());
        }
        if sub_queries.len() == max {
            break;
        }
    }

    if sub_queries.is_empty() {
        fallback()
    } else {
        sub_queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let parsed = parse_sub_queries(r#"["a", "b"]"#, "orig", 5);
        assert_eq!(parsed, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_fenced_array() {
        let parsed = parse_sub_queries("```json\n[\"a\"]\n```", "orig", 5);
        assert_eq!(parsed, vec!["a"]);
    }

    #[test]
    fn test_non_json_falls_back() {
        let parsed = parse_sub_queries("Here are some queries: a, b", "orig", 5);
        assert_eq!(parsed, vec!["orig"]);
    }

    #[test]
    fn test_non_array_falls_back() {
        let parsed = parse_sub_queries(r#"{"queries": ["a"]}"#, "orig", 5);
        assert_eq!(parsed, vec!["orig"]);
    }

    #[test]
    fn test_non_string_element_falls_back() {
        let parsed = parse_sub_queries(r#"["a", 42]"#, "orig", 5);
        assert_eq!(parsed, vec!["orig"]);
    }

    #[test]
    fn test_empty_array_falls_back() {
        let parsed = parse_sub_queries("[]", "orig", 5);
        assert_eq!(parsed, vec!["orig"]);
    }

    #[test]
    fn test_truncated_to_max() {
        let parsed = parse_sub_queries(r#"["a", "b", "c", "d"]"#, "orig", 2);
        assert_eq!(parsed, vec!["a", "b"]);
    }
}
