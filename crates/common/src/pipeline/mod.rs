//! The Beacon request pipeline
//!
//! Decomposition, fan-out search aggregation, visualization classification,
//! and cited answer synthesis, orchestrated per request. Sub-query searches
//! run concurrently but progress is reported checkpointed in submission
//! order. No external failure here aborts the request: everything degrades
//! to a safe default except a generation failure during final synthesis.

mod aggregator;
mod classifier;
mod decomposer;
mod progress;
mod scorer;
mod synthesizer;

pub use aggregator::{dedup_and_rank, RankedResult, SearchAggregator};
pub use classifier::{
    Classification, IntentDetails, VisualizationClassifier, VisualizationIntent,
};
pub use decomposer::QueryDecomposer;
pub use progress::{ProcessingStep, ProgressEvent, ProgressSink, SearchProgress};
pub use scorer::RelevanceScorer;
pub use synthesizer::{
    Citation, ConversationContext, DecodeOrigin, ResponseSynthesizer, SynthesizedResponse,
};

use crate::config::AppConfig;
use crate::db::models::Conversation;
use crate::db::{ConversationStore, MessageRole, NewMessage};
use crate::errors::Result;
use crate::fetchers::{Fetchers, VisualizationResult};
use crate::generation::TextGenerator;
use crate::metrics;
use crate::websearch::WebSearcher;
use chrono::Utc;
use futures::stream::{FuturesOrdered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Pipeline tuning, lifted out of the full application config
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_sub_queries: usize,
    pub results_per_call: usize,
    pub max_context_results: usize,
    pub recency_window: u64,
    pub confidence_threshold: f64,
    pub quality_domains: Vec<String>,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_sub_queries: config.pipeline.max_sub_queries,
            results_per_call: config.search.results_per_call,
            max_context_results: config.pipeline.max_context_results,
            recency_window: config.pipeline.recency_window,
            confidence_threshold: config.pipeline.confidence_threshold,
            quality_domains: config.relevance.quality_domains.clone(),
        }
    }
}

/// Output of the synchronous conversation-continuation flow
#[derive(Debug, Clone)]
pub struct ContinuationOutcome {
    pub conversation_id: Uuid,
    pub response: String,
    pub citations: Vec<Citation>,
    pub visualization: Option<VisualizationResult>,
    pub visualization_context: Option<String>,
}

/// One pipeline instance shared across requests.
///
/// Capabilities are injected handles, never ambient globals, so the whole
/// pipeline runs against fakes in tests.
pub struct SearchPipeline {
    generator: Arc<dyn TextGenerator>,
    searcher: Arc<dyn WebSearcher>,
    fetchers: Arc<Fetchers>,
    store: Arc<dyn ConversationStore>,
    decomposer: QueryDecomposer,
    aggregator: SearchAggregator,
    classifier: VisualizationClassifier,
    synthesizer: ResponseSynthesizer,
    recency_window: u64,
}

impl SearchPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        searcher: Arc<dyn WebSearcher>,
        fetchers: Arc<Fetchers>,
        store: Arc<dyn ConversationStore>,
        settings: PipelineSettings,
    ) -> Self {
        let scorer = RelevanceScorer::new(settings.quality_domains.clone());

        Self {
            generator,
            searcher,
            fetchers,
            store,
            decomposer: QueryDecomposer::new(settings.max_sub_queries),
            aggregator: SearchAggregator::new(scorer, settings.results_per_call),
            classifier: VisualizationClassifier::new(settings.confidence_threshold),
            synthesizer: ResponseSynthesizer::new(settings.max_context_results),
            recency_window: settings.recency_window,
        }
    }

    /// Run the full search flow for a top-level query, streaming ordered
    /// progress events into `sink`.
    ///
    /// An error return means either the client went away or the final
    /// synthesis call failed; the caller decides whether a terminal error
    /// event can still be flushed.
    pub async fn run_streaming(&self, query: &str, sink: &ProgressSink) -> Result<()> {
        let started = Instant::now();

        let conversation = match self.store.create_conversation(query).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create conversation record, continuing detached");
                detached_conversation(query)
            }
        };

        if let Err(e) = self
            .store
            .append_message(NewMessage::plain(conversation.id, MessageRole::User, query))
            .await
        {
            tracing::warn!(error = %e, "Failed to persist user message");
        }

        sink.emit(ProgressEvent::Processing {
            step: ProcessingStep::Decomposition,
        })
        .await?;

        let sub_queries = self.decomposer.decompose(self.generator.as_ref(), query).await;

        sink.emit(ProgressEvent::Decomposition {
            sub_queries: sub_queries.clone(),
        })
        .await?;

        sink.emit(ProgressEvent::Processing {
            step: ProcessingStep::Search,
        })
        .await?;

        // Concurrent searches, flushed checkpointed in submission order
        let total = sub_queries.len();
        let mut pending: FuturesOrdered<_> = sub_queries
            .iter()
            .map(|sq| self.aggregator.search_sub_query(self.searcher.as_ref(), sq, query))
            .collect();

        let mut batches: Vec<Vec<RankedResult>> = Vec::with_capacity(total);
        while let Some(batch) = pending.next().await {
            let current = batches.len() + 1;
            sink.emit(ProgressEvent::Search {
                sub_query: sub_queries[current - 1].clone(),
                partial_results: batch.clone(),
                progress: SearchProgress { current, total },
            })
            .await?;
            batches.push(batch);
        }
        drop(pending);

        sink.emit(ProgressEvent::Processing {
            step: ProcessingStep::Analysis,
        })
        .await?;

        let ranked = dedup_and_rank(batches.into_iter().flatten().collect());

        let context = ConversationContext {
            summary: String::new(),
            recent_turns: vec![("user".to_string(), query.to_string())],
        };

        let classification = self
            .classifier
            .classify(self.generator.as_ref(), query, &context.summary, &context.recent_turns)
            .await;

        let visualization = self
            .classifier
            .dispatch(&self.fetchers, &classification.intent)
            .await;

        let synthesis = self
            .synthesizer
            .synthesize(
                self.generator.as_ref(),
                query,
                &context,
                &ranked,
                visualization.as_ref(),
            )
            .await?;

        self.persist_turn(conversation.id, &synthesis, visualization, &ranked)
            .await;

        sink.emit(ProgressEvent::Complete {
            search_results: ranked.clone(),
            summary_text: synthesis.response.clone(),
            original_query: query.to_string(),
            conversation_id: conversation.id,
        })
        .await?;

        metrics::record_pipeline("search", started.elapsed().as_secs_f64(), ranked.len());

        tracing::info!(
            conversation_id = %conversation.id,
            sub_queries = total,
            results = ranked.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Search pipeline completed"
        );

        Ok(())
    }

    /// Continue an existing conversation: no fresh decomposition, one
    /// aggregation pass over the classifier's enriched query, then
    /// synthesis against the stored context.
    pub async fn continue_conversation(
        &self,
        conversation_id: Uuid,
        message: &str,
    ) -> Result<ContinuationOutcome> {
        let started = Instant::now();

        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| crate::errors::AppError::ConversationNotFound {
                id: conversation_id.to_string(),
            })?;

        // Prior messages only; the new message rides in the prompt itself
        let recent_turns = match self
            .store
            .recent_messages(conversation_id, self.recency_window)
            .await
        {
            Ok(messages) => messages
                .into_iter()
                .map(|m| (m.role, m.content))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load recent messages");
                Vec::new()
            }
        };

        if let Err(e) = self
            .store
            .append_message(NewMessage::plain(conversation_id, MessageRole::User, message))
            .await
        {
            tracing::warn!(error = %e, "Failed to persist user message");
        }

        let context = ConversationContext {
            summary: conversation.summary.clone(),
            recent_turns,
        };

        let classification = self
            .classifier
            .classify(
                self.generator.as_ref(),
                message,
                &context.summary,
                &context.recent_turns,
            )
            .await;

        let batch = self
            .aggregator
            .search_sub_query(
                self.searcher.as_ref(),
                &classification.enriched_query,
                message,
            )
            .await;
        let ranked = dedup_and_rank(batch);

        let visualization = self
            .classifier
            .dispatch(&self.fetchers, &classification.intent)
            .await;

        let synthesis = self
            .synthesizer
            .synthesize(
                self.generator.as_ref(),
                message,
                &context,
                &ranked,
                visualization.as_ref(),
            )
            .await?;

        self.persist_turn(conversation_id, &synthesis, visualization.clone(), &ranked)
            .await;

        metrics::record_pipeline(
            "continuation",
            started.elapsed().as_secs_f64(),
            ranked.len(),
        );

        tracing::info!(
            conversation_id = %conversation_id,
            results = ranked.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Continuation completed"
        );

        Ok(ContinuationOutcome {
            conversation_id,
            response: synthesis.response,
            citations: synthesis.citations,
            visualization,
            visualization_context: synthesis.visualization_context,
        })
    }

    /// Persist the assistant turn. Each write is independent; failures are
    /// logged and the user-visible response proceeds regardless.
    async fn persist_turn(
        &self,
        conversation_id: Uuid,
        synthesis: &SynthesizedResponse,
        visualization: Option<VisualizationResult>,
        results: &[RankedResult],
    ) {
        let message = NewMessage {
            conversation_id,
            role: MessageRole::Assistant,
            content: synthesis.response.clone(),
            citations: Some(synthesis.citations.clone()),
            visualization,
            visualization_context: synthesis.visualization_context.clone(),
        };
        if let Err(e) = self.store.append_message(message).await {
            tracing::warn!(error = %e, "Failed to persist assistant message");
        }

        if let Err(e) = self
            .store
            .append_search_results(conversation_id, results)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist search results");
        }

        if let Err(e) = self
            .store
            .update_summary(conversation_id, &synthesis.response)
            .await
        {
            tracing::warn!(error = %e, "Failed to update conversation summary");
        }
    }
}

/// Stand-in conversation when the store cannot create one; keeps the
/// request serviceable with persistence degraded to no-ops that log.
fn detached_conversation(query: &str) -> Conversation {
    let now = Utc::now();
    Conversation {
        id: Uuid::new_v4(),
        query: query.to_string(),
        summary: String::new(),
        created_at: now.into(),
        updated_at: now.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::errors::AppError;
    use crate::fetchers::{VisualizationKind, VisualizationStatus};
    use crate::websearch::WebHit;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Pops one canned response per generate call; None entries fail
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Option<String>>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Option<&str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Some(response)) => Ok(response),
                _ => Err(AppError::GenerationError {
                    message: "scripted failure".to_string(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Returns the same hits for every query
    struct StaticSearcher {
        hits: Vec<WebHit>,
    }

    #[async_trait]
    impl WebSearcher for StaticSearcher {
        async fn search(&self, _query: &str, count: usize) -> Result<Vec<WebHit>> {
            Ok(self.hits.iter().take(count).cloned().collect())
        }
    }

    fn hit(url: &str) -> WebHit {
        WebHit {
            title: format!("Title for {}", url),
            snippet: "a snippet about rust".to_string(),
            link: url.to_string(),
            date: None,
        }
    }

    const NONE_CLASSIFICATION: &str = r#"{"enhancedQuery": "enriched", "intent": {"type": "none", "entities": [], "confidence": 0.0, "details": {}}}"#;

    const SIMPLE_SYNTHESIS: &str = r#"{"response": "An answer [1].", "citations": [{"number": 1, "source": "example.com", "url": "https://example.com/a"}], "visualizationContext": null}"#;

    fn build(
        generator: ScriptedGenerator,
        searcher: StaticSearcher,
        store: Arc<MemoryStore>,
    ) -> SearchPipeline {
        let config = AppConfig::default();
        SearchPipeline::new(
            Arc::new(generator),
            Arc::new(searcher),
            Arc::new(Fetchers::new(&config).unwrap()),
            store,
            PipelineSettings::from(&config),
        )
    }

    async fn run_and_collect(
        pipeline: &SearchPipeline,
        query: &str,
    ) -> (Result<()>, Vec<ProgressEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = ProgressSink::new(tx);

        let outcome = pipeline.run_streaming(query, &sink).await;
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn test_streaming_event_order() {
        let generator = ScriptedGenerator::new(vec![
            Some(r#"["rust tokio", "rust async-std"]"#),
            Some(NONE_CLASSIFICATION),
            Some(SIMPLE_SYNTHESIS),
        ]);
        let searcher = StaticSearcher {
            hits: vec![hit("https://example.com/a"), hit("https://example.com/b")],
        };
        let store = Arc::new(MemoryStore::new());
        let pipeline = build(generator, searcher, store.clone());

        let (outcome, events) = run_and_collect(&pipeline, "rust async runtimes").await;
        outcome.unwrap();

        let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "processing",
                "decomposition",
                "processing",
                "search",
                "search",
                "processing",
                "complete"
            ]
        );

        // Search events arrive in sub-query submission order
        let sub_queries: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Search { sub_query, .. } => Some(sub_query.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sub_queries, vec!["rust tokio", "rust async-std"]);

        match events.last().unwrap() {
            ProgressEvent::Complete {
                search_results,
                summary_text,
                original_query,
                ..
            } => {
                assert_eq!(original_query, "rust async runtimes");
                assert_eq!(summary_text, "An answer [1].");
                // Two distinct URLs across all passes
                assert_eq!(search_results.len(), 2);
            }
            other => panic!("expected complete event, got {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_search_event_count_matches_sub_queries() {
        let generator = ScriptedGenerator::new(vec![
            Some(r#"["a", "b", "c"]"#),
            Some(NONE_CLASSIFICATION),
            Some(SIMPLE_SYNTHESIS),
        ]);
        let searcher = StaticSearcher { hits: vec![hit("https://example.com/a")] };
        let pipeline = build(generator, searcher, Arc::new(MemoryStore::new()));

        let (outcome, events) = run_and_collect(&pipeline, "q").await;
        outcome.unwrap();

        let search_events = events.iter().filter(|e| e.kind() == "search").count();
        assert_eq!(search_events, 3);
    }

    #[tokio::test]
    async fn test_decomposition_failure_uses_original_query() {
        let generator = ScriptedGenerator::new(vec![
            None, // decomposition call fails
            Some(NONE_CLASSIFICATION),
            Some(SIMPLE_SYNTHESIS),
        ]);
        let searcher = StaticSearcher { hits: vec![hit("https://example.com/a")] };
        let pipeline = build(generator, searcher, Arc::new(MemoryStore::new()));

        let (outcome, events) = run_and_collect(&pipeline, "original question").await;
        outcome.unwrap();

        match &events[1] {
            ProgressEvent::Decomposition { sub_queries } => {
                assert_eq!(sub_queries, &vec!["original question".to_string()]);
            }
            other => panic!("expected decomposition event, got {:?}", other.kind()),
        }
        assert_eq!(events.iter().filter(|e| e.kind() == "search").count(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_transport_failure_is_terminal() {
        let generator = ScriptedGenerator::new(vec![
            Some(r#"["a"]"#),
            Some(NONE_CLASSIFICATION),
            None, // synthesis call fails
        ]);
        let searcher = StaticSearcher { hits: vec![hit("https://example.com/a")] };
        let pipeline = build(generator, searcher, Arc::new(MemoryStore::new()));

        let (outcome, events) = run_and_collect(&pipeline, "q").await;
        assert!(matches!(outcome, Err(AppError::GenerationError { .. })));
        // Flushed progress is not retracted and no complete event follows
        assert!(events.iter().all(|e| e.kind() != "complete"));
    }

    #[tokio::test]
    async fn test_persisted_turn_and_summary() {
        let generator = ScriptedGenerator::new(vec![
            Some(r#"["a"]"#),
            Some(NONE_CLASSIFICATION),
            Some(SIMPLE_SYNTHESIS),
        ]);
        let searcher = StaticSearcher { hits: vec![hit("https://example.com/a")] };
        let store = Arc::new(MemoryStore::new());
        let pipeline = build(generator, searcher, store.clone());

        let (outcome, events) = run_and_collect(&pipeline, "q").await;
        outcome.unwrap();

        let conversation_id = match events.last().unwrap() {
            ProgressEvent::Complete { conversation_id, .. } => *conversation_id,
            _ => unreachable!(),
        };

        let conversation = store.find_conversation(conversation_id).await.unwrap().unwrap();
        assert_eq!(conversation.summary, "An answer [1].");

        let messages = store.list_messages(conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert!(messages[1].citations.is_some());

        let results = store.list_search_results(conversation_id).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_continuation_unknown_conversation() {
        let generator = ScriptedGenerator::new(vec![]);
        let searcher = StaticSearcher { hits: vec![] };
        let pipeline = build(generator, searcher, Arc::new(MemoryStore::new()));

        let err = pipeline
            .continue_conversation(Uuid::new_v4(), "follow up")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConversationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_continuation_citations_bounded_by_results() {
        let generator = ScriptedGenerator::new(vec![
            Some(NONE_CLASSIFICATION),
            // Cites [1] and an out-of-range [9]
            Some(
                r#"{"response": "More detail [1][9].", "citations": [
                    {"number": 1, "source": "example.com", "url": "https://example.com/a"},
                    {"number": 9, "source": "example.com", "url": "https://example.com/z"}
                ]}"#,
            ),
        ]);
        let searcher = StaticSearcher {
            hits: vec![hit("https://example.com/a"), hit("https://example.com/b")],
        };
        let store = Arc::new(MemoryStore::new());
        let pipeline = build(generator, searcher, store.clone());

        let conversation = store.create_conversation("first question").await.unwrap();
        let outcome = pipeline
            .continue_conversation(conversation.id, "follow up")
            .await
            .unwrap();

        assert_eq!(outcome.conversation_id, conversation.id);
        assert!(!outcome.citations.is_empty());
        assert!(outcome.citations.iter().all(|c| c.number <= 2));

        let messages = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.last().unwrap().role, "assistant");
    }

    #[tokio::test]
    async fn test_continuation_fallback_extraction() {
        let generator = ScriptedGenerator::new(vec![
            Some(NONE_CLASSIFICATION),
            // Unparseable synthesis output triggers the regex extractor
            Some("Plainly: the data [1] and the report [2] agree. Again [1]."),
        ]);
        let searcher = StaticSearcher {
            hits: vec![hit("https://example.com/a"), hit("https://example.com/b")],
        };
        let store = Arc::new(MemoryStore::new());
        let pipeline = build(generator, searcher, store.clone());

        let conversation = store.create_conversation("q").await.unwrap();
        let outcome = pipeline
            .continue_conversation(conversation.id, "follow up")
            .await
            .unwrap();

        assert!(outcome.response.starts_with("Plainly:"));
        assert_eq!(outcome.citations.len(), 2);
    }

    #[tokio::test]
    async fn test_weather_dispatch_unreachable_service() {
        let mut config = AppConfig::default();
        // Nothing listens here; the fetcher must degrade, not propagate
        config.weather.geocoding_endpoint = "http://127.0.0.1:9/v1/search".to_string();

        let fetchers = Fetchers::new(&config).unwrap();
        let classifier = VisualizationClassifier::new(0.7);
        let intent = VisualizationIntent {
            kind: VisualizationKind::Weather,
            entities: vec![],
            confidence: 0.9,
            details: IntentDetails {
                stock_symbol: None,
                location: Some("Tokyo".to_string()),
            },
        };

        let result = classifier.dispatch(&fetchers, &intent).await.unwrap();
        assert_eq!(result.status, VisualizationStatus::Error);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_low_confidence_skips_dispatch() {
        let config = AppConfig::default();
        let fetchers = Fetchers::new(&config).unwrap();
        let classifier = VisualizationClassifier::new(0.7);
        let intent = VisualizationIntent {
            kind: VisualizationKind::Financial,
            entities: vec![],
            confidence: 0.5,
            details: IntentDetails {
                stock_symbol: Some("AAPL".to_string()),
                location: None,
            },
        };

        assert!(classifier.dispatch(&fetchers, &intent).await.is_none());
    }
}
