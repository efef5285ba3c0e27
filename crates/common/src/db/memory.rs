//! In-memory conversation store for tests and local development

use crate::db::models::{Conversation, Message};
use crate::db::{ConversationStore, NewMessage};
use crate::errors::{AppError, Result};
use crate::pipeline::RankedResult;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
    results: HashMap<Uuid, Vec<RankedResult>>,
}

/// A `ConversationStore` backed by process memory.
///
/// Insert order doubles as timestamp order, which keeps message
/// history deterministic even when appends land on the same instant.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, query: &str) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            query: query.to_string(),
            summary: String::new(),
            created_at: now.into(),
            updated_at: now.into(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn update_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

        conversation.summary = summary.to_string();
        conversation.updated_at = Utc::now().into();
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message> {
        let citations = message
            .citations
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let visualization = message
            .visualization
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            role: message.role.as_str().to_string(),
            content: message.content,
            citations,
            visualization,
            visualization_context: message.visualization_context,
            created_at: Utc::now().into(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.messages.push(row.clone());
        Ok(row)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let history: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        let skip = history.len().saturating_sub(limit as usize);
        Ok(history.into_iter().skip(skip).collect())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn append_search_results(
        &self,
        conversation_id: Uuid,
        results: &[RankedResult],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .results
            .entry(conversation_id)
            .or_default()
            .extend_from_slice(results);
        Ok(())
    }

    async fn list_search_results(&self, conversation_id: Uuid) -> Result<Vec<RankedResult>> {
        let inner = self.inner.lock().unwrap();
        let mut results = inner
            .results
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MessageRole;

    #[tokio::test]
    async fn test_conversation_roundtrip() {
        let store = MemoryStore::new();

        let conversation = store.create_conversation("rust async runtimes").await.unwrap();
        assert!(conversation.summary.is_empty());

        store.update_summary(conversation.id, "tokio dominates").await.unwrap();
        let found = store.find_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(found.summary, "tokio dominates");
    }

    #[tokio::test]
    async fn test_recent_messages_window() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("q").await.unwrap();

        for i in 0..5 {
            store
                .append_message(NewMessage::plain(
                    conversation.id,
                    MessageRole::User,
                    format!("message {}", i),
                ))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(conversation.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "message 2");
        assert_eq!(recent[2].content, "message 4");
    }

    #[tokio::test]
    async fn test_update_summary_unknown_conversation() {
        let store = MemoryStore::new();
        let err = store.update_summary(Uuid::new_v4(), "s").await.unwrap_err();
        assert!(matches!(err, AppError::ConversationNotFound { .. }));
    }
}
