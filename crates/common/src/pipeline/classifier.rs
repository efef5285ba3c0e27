//! Visualization intent classification
//!
//! One generation call returns both an enriched search query and the
//! visualization intent, saving a round trip. Parsing failure yields a
//! no-intent classification and the original query; it never errors.

use crate::fetchers::{Fetchers, VisualizationKind, VisualizationResult};
use crate::generation::{strip_code_fences, TextGenerator};
use crate::metrics;
use serde::{Deserialize, Serialize};

/// Structured intent details surfaced by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentDetails {
    pub stock_symbol: Option<String>,
    pub location: Option<String>,
}

/// What kind of auxiliary dataset the query implies, and how sure the
/// model is about it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationIntent {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    pub entities: Vec<String>,
    pub confidence: f64,
    pub details: IntentDetails,
}

impl Default for VisualizationIntent {
    fn default() -> Self {
        Self {
            kind: VisualizationKind::None,
            entities: Vec::new(),
            confidence: 0.0,
            details: IntentDetails::default(),
        }
    }
}

/// Classifier output: the intent plus a search-optimized rewording
#[derive(Debug, Clone)]
pub struct Classification {
    pub enriched_query: String,
    pub intent: VisualizationIntent,
}

pub struct VisualizationClassifier {
    confidence_threshold: f64,
}

impl VisualizationClassifier {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Classify a query in its conversation context. Never fails.
    pub async fn classify(
        &self,
        generator: &dyn TextGenerator,
        query: &str,
        summary: &str,
        recent_turns: &[(String, String)],
    ) -> Classification {
        let prompt = build_prompt(query, summary, recent_turns);

        match generator.generate(&prompt).await {
            Ok(raw) => {
                metrics::record_generation("classification", true);
                parse_classification(&raw, query)
            }
            Err(e) => {
                metrics::record_generation("classification", false);
                tracing::warn!(error = %e, "Classification call failed");
                Classification {
                    enriched_query: query.to_string(),
                    intent: VisualizationIntent::default(),
                }
            }
        }
    }

    /// Invoke the fetcher matching a confident intent.
    ///
    /// Returns None below the confidence threshold or when the intent
    /// carries no usable target; fetcher failures come back as an error
    /// envelope, not as None.
    pub async fn dispatch(
        &self,
        fetchers: &Fetchers,
        intent: &VisualizationIntent,
    ) -> Option<VisualizationResult> {
        if intent.confidence <= self.confidence_threshold {
            return None;
        }

        let (kind, target) = fetch_target(intent)?;

        let result = match kind {
            VisualizationKind::Geographic => fetchers.geographic.fetch(&target).await,
            VisualizationKind::Financial => fetchers.financial.fetch(&target).await,
            VisualizationKind::Weather => fetchers.weather.fetch(&target).await,
            VisualizationKind::None => return None,
        };

        metrics::record_fetcher(kind.as_str(), result.is_success());
        Some(result)
    }
}

fn build_prompt(query: &str, summary: &str, recent_turns: &[(String, String)]) -> String {
    let mut context = String::new();
    if !summary.is_empty() {
        context.push_str(&format!("Conversation summary: {}\n", summary));
    }
    for (role, content) in recent_turns {
        context.push_str(&format!("{}: {}\n", role, content));
    }

    format!(
        "You are analyzing a user query for a search assistant.\n\n\
        {}User query: {}\n\n\
        Produce two things at once:\n\
        1. enhancedQuery: the query reworded for a web search engine, \
        resolving pronouns from the conversation context.\n\
        2. intent: whether the query calls for an auxiliary visualization. \
        type is one of \"none\", \"geographic\", \"financial\", \"weather\". \
        entities lists the relevant names in order of importance. \
        confidence is between 0 and 1. For financial intents set \
        details.stockSymbol to the ticker; for weather intents set \
        details.location to the place name.\n\n\
        Respond with ONLY this JSON, no other text:\n\
        {{\"enhancedQuery\": \"...\", \"intent\": {{\"type\": \"none\", \
        \"entities\": [], \"confidence\": 0.0, \"details\": {{}}}}}}",
        context, query
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawClassification {
    enhanced_query: Option<String>,
    intent: Option<RawIntent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawIntent {
    #[serde(rename = "type")]
    kind: Option<String>,
    entities: Vec<String>,
    confidence: f64,
    details: IntentDetails,
}

/// Decode the model's combined output; anything unusable degrades to a
/// no-intent classification over the original query.
pub(crate) fn parse_classification(raw: &str, original_query: &str) -> Classification {
    let fallback = || Classification {
        enriched_query: original_query.to_string(),
        intent: VisualizationIntent::default(),
    };

    let Ok(parsed) = serde_json::from_str::<RawClassification>(strip_code_fences(raw)) else {
        tracing::debug!("Classification output was not valid JSON");
        return fallback();
    };

    let enriched_query = parsed
        .enhanced_query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| original_query.to_string());

    let intent = match parsed.intent {
        Some(raw_intent) => VisualizationIntent {
            kind: kind_from_str(raw_intent.kind.as_deref().unwrap_or("none")),
            entities: raw_intent.entities,
            confidence: raw_intent.confidence.clamp(0.0, 1.0),
            details: raw_intent.details,
        },
        None => VisualizationIntent::default(),
    };

    Classification {
        enriched_query,
        intent,
    }
}

fn kind_from_str(raw: &str) -> VisualizationKind {
    match raw.trim().to_lowercase().as_str() {
        "geographic" => VisualizationKind::Geographic,
        "financial" => VisualizationKind::Financial,
        "weather" => VisualizationKind::Weather,
        _ => VisualizationKind::None,
    }
}

/// The fetcher argument for a confident intent: first entity for
/// geographic, ticker for financial, place name for weather.
pub(crate) fn fetch_target(intent: &VisualizationIntent) -> Option<(VisualizationKind, String)> {
    let target = match intent.kind {
        VisualizationKind::Geographic => intent.entities.first().cloned(),
        VisualizationKind::Financial => intent.details.stock_symbol.clone(),
        VisualizationKind::Weather => intent.details.location.clone(),
        VisualizationKind::None => None,
    };

    match target {
        Some(t) if !t.trim().is_empty() => Some((intent.kind, t)),
        _ => {
            if intent.kind != VisualizationKind::None {
                tracing::debug!(kind = intent.kind.as_str(), "Intent without a usable target");
            }
            None
        }
    }
}
