//! Conversation handlers
//!
//! The synchronous continuation endpoint and the conversation history read.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use beacon_common::{
    db::{ConversationStore, Repository},
    errors::{AppError, Result},
    fetchers::VisualizationResult,
    pipeline::Citation,
};

/// Continuation request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,

    pub conversation_id: Uuid,
}

/// Continuation response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_context: Option<String>,
    pub conversation_id: Uuid,
}

/// Continue an existing conversation with a follow-up message
pub async fn continue_conversation(
    State(state): State<AppState>,
    Json(request): Json<ContinueRequest>,
) -> Result<Json<ContinueResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let outcome = state
        .pipeline
        .continue_conversation(request.conversation_id, &request.message)
        .await?;

    tracing::info!(
        conversation_id = %outcome.conversation_id,
        citations = outcome.citations.len(),
        "Continuation answered"
    );

    Ok(Json(ContinueResponse {
        response: outcome.response,
        citations: outcome.citations,
        visualization: outcome.visualization,
        visualization_context: outcome.visualization_context,
        conversation_id: outcome.conversation_id,
    }))
}

/// Conversation history response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub query: String,
    pub summary: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<MessageView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_context: Option<String>,
    pub created_at: String,
}

/// Fetch a conversation with its ordered message history
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let repo = Repository::new(state.db.clone());

    let conversation = repo
        .find_conversation(id)
        .await?
        .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

    let messages = repo
        .list_messages(id)
        .await?
        .into_iter()
        .map(|m| MessageView {
            id: m.id,
            role: m.role,
            content: m.content,
            citations: m
                .citations
                .and_then(|v| serde_json::from_value(v).ok()),
            visualization: m
                .visualization
                .and_then(|v| serde_json::from_value(v).ok()),
            visualization_context: m.visualization_context,
            created_at: m.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(ConversationResponse {
        id: conversation.id,
        query: conversation.query,
        summary: conversation.summary,
        created_at: conversation.created_at.to_rfc3339(),
        updated_at: conversation.updated_at.to_rfc3339(),
        messages,
    }))
}
