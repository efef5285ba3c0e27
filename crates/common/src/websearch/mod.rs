//! Web-search capability
//!
//! Returns an ordered list of raw hits for a query string. Each underlying
//! call is capped at 10 results; callers needing more issue more calls.

use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Hard cap on results per underlying search call
pub const MAX_RESULTS_PER_CALL: usize = 10;

/// A raw search hit as returned by the provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebHit {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub link: String,
    /// Publish date when the provider surfaces one
    #[serde(default)]
    pub date: Option<String>,
}

/// Trait for the web-search capability
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search for a query, returning at most `count` ordered hits
    async fn search(&self, query: &str, count: usize) -> Result<Vec<WebHit>>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<WebHit>,
}

/// HTTP search client (Serper-style JSON API)
pub struct HttpSearchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSearchClient {
    /// Create a new search client from configuration
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl WebSearcher for HttpSearchClient {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<WebHit>> {
        let request = SearchRequest {
            q: query,
            num: count.min(MAX_RESULTS_PER_CALL),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::SearchError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SearchError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: SearchResponse =
            response.json().await.map_err(|e| AppError::SearchError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(result.organic.into_iter().take(request.num).collect())
    }
}

/// Create a searcher from configuration
pub fn create_searcher(config: &SearchConfig) -> Result<Arc<dyn WebSearcher>> {
    Ok(Arc::new(HttpSearchClient::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_parsing_with_date() {
        let raw = r#"{"organic": [
            {"title": "T", "snippet": "S", "link": "https://example.com", "date": "2026-01-05"}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.organic.len(), 1);
        assert_eq!(parsed.organic[0].date.as_deref(), Some("2026-01-05"));
    }

    #[test]
    fn test_hit_parsing_without_optional_fields() {
        let raw = r#"{"organic": [{"title": "T", "link": "https://example.com"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.organic[0].snippet.is_empty());
        assert!(parsed.organic[0].date.is_none());
    }
}
