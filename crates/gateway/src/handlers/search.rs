//! Streaming search handler
//!
//! Runs the full pipeline for a top-level query and streams its ordered
//! progress events to the client as SSE. The connection closes after the
//! complete event, or after a terminal error event; if the client
//! disconnects first, the pipeline task notices its next flush failing and
//! abandons the request.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use validator::Validate;

use crate::AppState;
use beacon_common::{
    errors::{AppError, Result},
    pipeline::{ProgressEvent, ProgressSink},
};

/// Streaming search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,
}

/// Run a search, streaming progress events until completion
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    tracing::info!(query = %request.query, "Search accepted");

    let (tx, rx) = mpsc::channel::<ProgressEvent>(32);
    let sink = ProgressSink::new(tx);
    let pipeline = state.pipeline.clone();
    let query = request.query;

    tokio::spawn(async move {
        if let Err(e) = pipeline.run_streaming(&query, &sink).await {
            tracing::error!(error = %e, "Search pipeline failed");
            // Best effort: the client may already be gone
            let _ = sink
                .emit(ProgressEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
