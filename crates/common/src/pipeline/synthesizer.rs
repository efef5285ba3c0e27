//! Answer synthesis
//!
//! Builds a numbered-context prompt over the top aggregated results and
//! decodes the model's strict-JSON reply. When that decode fails, a
//! secondary extractor recovers citations from `[n]` markers in the raw
//! text; both paths share one output type tagged with its decode origin.

use crate::errors::Result;
use crate::fetchers::VisualizationResult;
use crate::generation::{strip_code_fences, TextGenerator};
use crate::metrics;
use crate::pipeline::RankedResult;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A numbered reference tying an in-text `[n]` marker to a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based, matches the marker in the response text
    pub number: usize,
    /// Source domain, or a placeholder when unresolvable
    pub source: String,
    pub url: String,
}

/// Which decoder produced the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOrigin {
    Parsed,
    Fallback,
}

/// Synthesized answer with its citations
#[derive(Debug, Clone)]
pub struct SynthesizedResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    pub visualization_context: Option<String>,
    pub origin: DecodeOrigin,
}

/// Conversation context fed back into the prompt
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub summary: String,
    /// (role, content) pairs, oldest first
    pub recent_turns: Vec<(String, String)>,
}

pub struct ResponseSynthesizer {
    max_context_results: usize,
}

impl ResponseSynthesizer {
    pub fn new(max_context_results: usize) -> Self {
        Self {
            max_context_results,
        }
    }

    /// Produce the final answer over the top results.
    ///
    /// Fails only when the generation call itself fails; malformed output
    /// is recovered by the fallback decoder.
    pub async fn synthesize(
        &self,
        generator: &dyn TextGenerator,
        query: &str,
        context: &ConversationContext,
        results: &[RankedResult],
        visualization: Option<&VisualizationResult>,
    ) -> Result<SynthesizedResponse> {
        let window = &results[..results.len().min(self.max_context_results)];
        let prompt = build_prompt(query, context, window, visualization);

        let raw = match generator.generate(&prompt).await {
            Ok(raw) => {
                metrics::record_generation("synthesis", true);
                raw
            }
            Err(e) => {
                metrics::record_generation("synthesis", false);
                return Err(e);
            }
        };

        Ok(decode_response(&raw, window))
    }
}

fn build_prompt(
    query: &str,
    context: &ConversationContext,
    results: &[RankedResult],
    visualization: Option<&VisualizationResult>,
) -> String {
    let mut prompt = String::from(
        "You are a research assistant. Answer the question using ONLY the \
        numbered sources below. Cite sources inline with [1], [2], etc. \
        If the sources do not contain enough information, say so.\n\n",
    );

    if !context.summary.is_empty() {
        prompt.push_str(&format!("Conversation so far: {}\n", context.summary));
    }
    for (role, content) in &context.recent_turns {
        prompt.push_str(&format!("{}: {}\n", role, content));
    }

    prompt.push_str(&format!("\nQuestion: {}\n\nSources:\n", query));

    for (i, result) in results.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            i + 1,
            result.title,
            result.source_domain,
            result.snippet
        ));
    }

    if let Some(viz) = visualization {
        if viz.is_success() {
            prompt.push_str(&format!(
                "Auxiliary {} data is attached to this answer:\n{}\n\n",
                viz.kind.as_str(),
                viz.payload
            ));
        }
    }

    prompt.push_str(
        "Respond with ONLY this JSON, no other text:\n\
        {\"response\": \"the answer with [n] citations\", \
        \"citations\": [{\"number\": 1, \"source\": \"domain\", \"url\": \"https://...\"}], \
        \"visualizationContext\": \"one sentence describing any attached data, or null\"}",
    );

    prompt
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSynthesis {
    response: String,
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(default)]
    visualization_context: Option<String>,
}

#[derive(Deserialize)]
struct RawCitation {
    number: usize,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
}

/// Primary strict-JSON decode with the regex extractor as fallback
pub(crate) fn decode_response(raw: &str, results: &[RankedResult]) -> SynthesizedResponse {
    match serde_json::from_str::<RawSynthesis>(strip_code_fences(raw)) {
        Ok(parsed) => {
            // Citation numbers beyond the considered results are dropped
            let citations = parsed
                .citations
                .into_iter()
                .filter(|c| c.number >= 1 && c.number <= results.len())
                .map(|c| {
                    let indexed = &results[c.number - 1];
                    Citation {
                        number: c.number,
                        source: if c.source.is_empty() {
                            indexed.source_domain.clone()
                        } else {
                            c.source
                        },
                        url: if c.url.is_empty() {
                            indexed.url.clone()
                        } else {
                            c.url
                        },
                    }
                })
                .collect();

            SynthesizedResponse {
                response: parsed.response,
                citations,
                visualization_context: parsed
                    .visualization_context
                    .filter(|c| !c.trim().is_empty()),
                origin: DecodeOrigin::Parsed,
            }
        }
        Err(_) => {
            tracing::warn!("Synthesis output was not valid JSON, extracting citations from text");
            SynthesizedResponse {
                response: raw.trim().to_string(),
                citations: fallback_citations(raw, results),
                visualization_context: None,
                origin: DecodeOrigin::Fallback,
            }
        }
    }
}

/// Map each distinct `[n]` marker in raw text to the n-th result, with a
/// placeholder for markers that resolve to nothing.
pub(crate) fn fallback_citations(text: &str, results: &[RankedResult]) -> Vec<Citation> {
    let marker = Regex::new(r"\[(\d+)\]").unwrap();
    let mut citations: Vec<Citation> = Vec::new();

    for caps in marker.captures_iter(text) {
        let Ok(number) = caps[1].parse::<usize>() else {
            continue;
        };
        if number == 0 || citations.iter().any(|c| c.number == number) {
            continue;
        }

        let citation = match results.get(number - 1) {
            Some(result) => Citation {
                number,
                source: result.source_domain.clone(),
                url: result.url.clone(),
            },
            None => Citation {
                number,
                source: "Reference not found".to_string(),
                url: "#".to_string(),
            },
        };
        citations.push(citation);
    }

    citations.sort_by_key(|c| c.number);
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn results(n: usize) -> Vec<RankedResult> {
        (1..=n)
            .map(|i| RankedResult {
                title: format!("Result {}", i),
                snippet: format!("snippet {}", i),
                url: format!("https://example.com/{}", i),
                source_domain: "example.com".to_string(),
                published_at: Utc::now(),
                relevance_score: 0.5,
            })
            .collect()
    }

    #[test]
    fn test_primary_decode() {
        let raw = r#"{
            "response": "Answer [1].",
            "citations": [{"number": 1, "source": "example.com", "url": "https://example.com/1"}],
            "visualizationContext": "Stock chart for AAPL"
        }"#;

        let decoded = decode_response(raw, &results(2));
        assert_eq!(decoded.origin, DecodeOrigin::Parsed);
        assert_eq!(decoded.citations.len(), 1);
        assert_eq!(
            decoded.visualization_context.as_deref(),
            Some("Stock chart for AAPL")
        );
    }

    #[test]
    fn test_primary_decode_filters_out_of_range_numbers() {
        let raw = r#"{
            "response": "Answer [1][7].",
            "citations": [
                {"number": 1, "source": "example.com", "url": "https://example.com/1"},
                {"number": 7, "source": "example.com", "url": "https://example.com/7"}
            ]
        }"#;

        let decoded = decode_response(raw, &results(2));
        assert_eq!(decoded.citations.len(), 1);
        assert!(decoded.citations.iter().all(|c| c.number <= 2));
    }

    #[test]
    fn test_fallback_decode_extracts_markers() {
        let raw = "The answer [1] depends on recent data [2]. See [1] again.";
        let decoded = decode_response(raw, &results(2));

        assert_eq!(decoded.origin, DecodeOrigin::Fallback);
        assert_eq!(decoded.response, raw);
        // Distinct markers only
        assert_eq!(decoded.citations.len(), 2);
        assert_eq!(decoded.citations[0].number, 1);
        assert_eq!(decoded.citations[0].url, "https://example.com/1");
    }

    #[test]
    fn test_fallback_placeholder_for_unmapped_index() {
        let citations = fallback_citations("claim [5]", &results(2));
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, "Reference not found");
        assert_eq!(citations[0].url, "#");
    }

    #[test]
    fn test_fallback_sorted_by_number() {
        let citations = fallback_citations("[3] then [1] then [2]", &results(3));
        let numbers: Vec<usize> = citations.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_fenced_json_still_parses() {
        let raw = "```json\n{\"response\": \"ok\", \"citations\": []}\n```";
        let decoded = decode_response(raw, &results(1));
        assert_eq!(decoded.origin, DecodeOrigin::Parsed);
        assert_eq!(decoded.response, "ok");
    }
}
