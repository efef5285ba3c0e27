//! Auxiliary data fetchers
//!
//! Each fetcher turns one identifying string (place name or ticker symbol)
//! into a normalized success/error envelope. Upstream failures are converted
//! locally and never propagated raw; every client runs with a bounded
//! timeout so the classifier path cannot block indefinitely.

mod financial;
mod geographic;
mod weather;

pub use financial::FinancialFetcher;
pub use geographic::GeographicFetcher;
pub use weather::WeatherFetcher;

use crate::config::AppConfig;
use crate::errors::Result;
use serde::{Deserialize, Serialize};

/// Which auxiliary dataset a query wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    #[default]
    None,
    Geographic,
    Financial,
    Weather,
}

impl VisualizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizationKind::None => "none",
            VisualizationKind::Geographic => "geographic",
            VisualizationKind::Financial => "financial",
            VisualizationKind::Weather => "weather",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationStatus {
    Success,
    Error,
}

/// Outcome of one fetcher call, attached to exactly one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationResult {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    pub payload: serde_json::Value,
    pub status: VisualizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VisualizationResult {
    pub fn success(kind: VisualizationKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            status: VisualizationStatus::Success,
            error: None,
        }
    }

    pub fn failure(kind: VisualizationKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
            status: VisualizationStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VisualizationStatus::Success
    }
}

/// All fetchers bundled for classifier dispatch
pub struct Fetchers {
    pub geographic: GeographicFetcher,
    pub financial: FinancialFetcher,
    pub weather: WeatherFetcher,
}

impl Fetchers {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            geographic: GeographicFetcher::new(&config.geocoding)?,
            financial: FinancialFetcher::new(&config.financial)?,
            weather: WeatherFetcher::new(&config.weather)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let result = VisualizationResult::success(
            VisualizationKind::Financial,
            serde_json::json!({"symbol": "AAPL"}),
        );

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "financial");
        assert_eq!(value["status"], "success");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_envelope_carries_message() {
        let result = VisualizationResult::failure(VisualizationKind::Weather, "unreachable");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "unreachable");
        assert!(value["payload"].is_null());
    }
}
