//! Ordered progress events for a streaming search request
//!
//! One request emits, in order: a processing marker for decomposition, the
//! decomposed sub-queries, a processing marker for search, one search event
//! per sub-query in submission order, a processing marker for analysis, and
//! a final complete event. Nothing is skipped even when a payload is empty,
//! and flushed events are never retracted.

use crate::errors::{AppError, Result};
use crate::pipeline::RankedResult;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStep {
    Decomposition,
    Search,
    Analysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchProgress {
    pub current: usize,
    pub total: usize,
}

/// One event on the stream, tagged by kind
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Processing { step: ProcessingStep },

    #[serde(rename_all = "camelCase")]
    Decomposition { sub_queries: Vec<String> },

    #[serde(rename_all = "camelCase")]
    Search {
        sub_query: String,
        partial_results: Vec<RankedResult>,
        progress: SearchProgress,
    },

    #[serde(rename_all = "camelCase")]
    Complete {
        search_results: Vec<RankedResult>,
        summary_text: String,
        original_query: String,
        conversation_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl ProgressEvent {
    /// Wire-level kind tag, handy for assertions
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Processing { .. } => "processing",
            ProgressEvent::Decomposition { .. } => "decomposition",
            ProgressEvent::Search { .. } => "search",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// Sending half of the progress stream.
///
/// A send failure means the client went away; the pipeline treats that as a
/// signal to abandon the request.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Flush one event, in order
    pub async fn emit(&self, event: ProgressEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| AppError::Internal {
            message: "progress stream closed by client".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = ProgressEvent::Processing {
            step: ProcessingStep::Decomposition,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "processing");
        assert_eq!(value["step"], "decomposition");
    }

    #[test]
    fn test_search_event_shape() {
        let event = ProgressEvent::Search {
            sub_query: "q".to_string(),
            partial_results: vec![],
            progress: SearchProgress { current: 1, total: 3 },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "search");
        assert_eq!(value["subQuery"], "q");
        assert_eq!(value["progress"]["current"], 1);
        assert_eq!(value["partialResults"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_emit_fails_after_receiver_drop() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let sink = ProgressSink::new(tx);
        let err = sink
            .emit(ProgressEvent::Error { message: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }
}
