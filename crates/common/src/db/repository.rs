//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling.

use crate::db::models::*;
use crate::db::{ConversationStore, DbPool, NewMessage};
use crate::errors::{AppError, Result};
use crate::pipeline::RankedResult;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl ConversationStore for Repository {
    async fn create_conversation(&self, query: &str) -> Result<Conversation> {
        let now = Utc::now();

        let conversation = ConversationActiveModel {
            id: Set(Uuid::new_v4()),
            query: Set(query.to_string()),
            summary: Set(String::new()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        conversation.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        ConversationEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        let conversation = ConversationEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

        let mut active: ConversationActiveModel = conversation.into();
        active.summary = Set(summary.to_string());
        active.updated_at = Set(Utc::now().into());
        active.update(self.write_conn()).await?;

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

        let row = MessageActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(message.conversation_id),
            role: Set(message.role.as_str().to_string()),
            content: Set(message.content),
            citations: Set(citations),
            visualization: Set(visualization),
            visualization_context: Set(message.visualization_context),
            created_at: Set(Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>> {
        let mut messages = MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_desc(MessageColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await?;

        messages.reverse();
        Ok(messages)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_asc(MessageColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn append_search_results(
        &self,
        conversation_id: Uuid,
        results: &[RankedResult],
    ) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let rows: Vec<SearchResultActiveModel> = results
            .iter()
            .map(|r| SearchResultActiveModel {
                id: Set(Uuid::new_v4()),
                conversation_id: Set(conversation_id),
                title: Set(r.title.clone()),
                snippet: Set(r.snippet.clone()),
                url: Set(r.url.clone()),
                source_domain: Set(r.source_domain.clone()),
                published_at: Set(r.published_at.into()),
                relevance_score: Set(r.relevance_score),
                created_at: Set(now.into()),
            })
            .collect();

        SearchResultEntity::insert_many(rows)
            .exec(self.write_conn())
            .await?;

        Ok(())
    }

    async fn list_search_results(&self, conversation_id: Uuid) -> Result<Vec<RankedResult>> {
        let rows = SearchResultEntity::find()
            .filter(SearchResultColumn::ConversationId.eq(conversation_id))
            .order_by_desc(SearchResultColumn::RelevanceScore)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| RankedResult {
                title: r.title,
                snippet: r.snippet,
                url: r.url,
                source_domain: r.source_domain,
                published_at: r.published_at.with_timezone(&Utc),
                relevance_score: r.relevance_score,
            })
            .collect())
    }
}
