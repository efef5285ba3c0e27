//! Database layer for Beacon
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - The `ConversationStore` boundary the pipeline persists through
//! - Connection pool management

pub mod memory;
pub mod models;
mod repository;

pub use memory::MemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::fetchers::VisualizationResult;
use crate::pipeline::{Citation, RankedResult};
use async_trait::async_trait;
use self::models::{Conversation, Message};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Payload for appending a message to a conversation
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub citations: Option<Vec<Citation>>,
    pub visualization: Option<VisualizationResult>,
    pub visualization_context: Option<String>,
}

impl NewMessage {
    /// A bare message with no citations or visualization attached
    pub fn plain(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role,
            content: content.into(),
            citations: None,
            visualization: None,
            visualization_context: None,
        }
    }
}

/// Persistence boundary for conversations, messages, and search results.
///
/// Every write is an independent insert (or the single summary update);
/// callers tolerate individual failures by logging and continuing.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation for a top-level query
    async fn create_conversation(&self, query: &str) -> Result<Conversation>;

    /// Find a conversation by id
    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Rewrite the rolling summary (once per completed request)
    async fn update_summary(&self, id: Uuid, summary: &str) -> Result<()>;

    /// Append a message; ordering is by timestamp
    async fn append_message(&self, message: NewMessage) -> Result<Message>;

    /// Last `limit` messages in chronological order
    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>>;

    /// Full message history in chronological order
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    /// Append one aggregation pass worth of results
    async fn append_search_results(
        &self,
        conversation_id: Uuid,
        results: &[RankedResult],
    ) -> Result<()>;

    /// Stored results for a conversation, highest score first
    async fn list_search_results(&self, conversation_id: Uuid) -> Result<Vec<RankedResult>>;
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let mut primary_opts = ConnectOptions::new(&config.url);
        primary_opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        let primary = Database::connect(primary_opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        // Connect to replica if configured
        let replica = if let Some(ref read_url) = config.read_url {
            info!("Connecting to read replica...");

            let mut replica_opts = ConnectOptions::new(read_url);
            replica_opts
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
                .sqlx_logging(true);

            let replica_conn = Database::connect(replica_opts)
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Failed to connect to replica: {}", e),
                })?;

            Some(replica_conn)
        } else {
            None
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}
