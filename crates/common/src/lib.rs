//! Beacon Common Library
//!
//! Shared code for the Beacon answer engine including:
//! - Database models and repository patterns
//! - Capability clients (text generation, web search)
//! - The request pipeline (decompose, aggregate, classify, synthesize)
//! - Auxiliary data fetchers (geographic, financial, weather)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod fetchers;
pub mod generation;
pub mod metrics;
pub mod pipeline;
pub mod websearch;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{ConversationStore, Repository};
pub use errors::{AppError, Result};
pub use generation::TextGenerator;
pub use pipeline::SearchPipeline;
pub use websearch::WebSearcher;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
