//! Financial fetcher
//!
//! Fetches a company overview and recent daily close/volume points for a
//! ticker symbol. The two upstream calls run concurrently; either one
//! failing substitutes placeholder fields, and only both failing yields an
//! error envelope.

use crate::config::FinancialConfig;
use crate::errors::{AppError, Result};
use crate::fetchers::{VisualizationKind, VisualizationResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// One daily series point
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StockPoint {
    pub date: String,
    pub close: f64,
    pub volume: u64,
}

pub struct FinancialFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    series_points: usize,
}

impl FinancialFetcher {
    pub fn new(config: &FinancialConfig) -> Result<Self> {
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
            series_points: config.series_points,
        })
    }

    pub async fn fetch(&self, symbol: &str) -> VisualizationResult {
        let (overview, series) = tokio::join!(
            self.query("OVERVIEW", symbol),
            self.query("TIME_SERIES_DAILY", symbol)
        );

        if overview.is_err() && series.is_err() {
            let message = overview.unwrap_err().to_string();
            tracing::warn!(symbol = %symbol, error = %message, "Market data unreachable");
            return VisualizationResult::failure(VisualizationKind::Financial, message);
        }

        let overview = match overview {
            Ok(value) => normalize_overview(value, symbol),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Overview fetch failed");
                placeholder_overview(symbol)
            }
        };

        let stock_data = match series {
            Ok(value) => parse_daily_series(&value, self.series_points),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Series fetch failed");
                Vec::new()
            }
        };

        VisualizationResult::success(
            VisualizationKind::Financial,
            json!({
                "symbol": symbol,
                "overview": overview,
                "stockData": stock_data,
            }),
        )
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::FetcherError {
                service: "market-data".to_string(),
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::FetcherError {
                service: "market-data".to_string(),
                message: format!("API error {}", response.status()),
            });
        }

        response.json().await.map_err(|e| AppError::FetcherError {
            service: "market-data".to_string(),
            message: format!("Failed to parse response: {}", e),
        })
    }
}

fn placeholder_overview(symbol: &str) -> Value {
    json!({ "Symbol": symbol })
}

/// Ensure the overview carries at least the symbol, even when the provider
/// returns an empty object (its behavior for unknown tickers).
fn normalize_overview(value: Value, symbol: &str) -> Value {
    match value {
        Value::Object(map) if !map.is_empty() => Value::Object(map),
        _ => placeholder_overview(symbol),
    }
}

/// Extract up to `max_points` most recent points from a daily series
/// document, preserving the upstream newest-first date order.
fn parse_daily_series(value: &Value, max_points: usize) -> Vec<StockPoint> {
    let Some(series) = value.get("Time Series (Daily)").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut dates: Vec<&String> = series.keys().collect();
    dates.sort_by(|a, b| b.cmp(a));

    dates
        .into_iter()
        .take(max_points)
        .filter_map(|date| {
            let fields = series.get(date)?;
            let close = fields.get("4. close")?.as_str()?.parse::<f64>().ok()?;
            let volume = fields.get("5. volume")?.as_str()?.parse::<u64>().ok()?;
            Some(StockPoint {
                date: date.clone(),
                close,
                volume,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_series() -> Value {
        json!({
            "Time Series (Daily)": {
                "2026-08-04": {"4. close": "213.25", "5. volume": "48210000"},
                "2026-08-05": {"4. close": "214.05", "5. volume": "50113200"},
                "2026-08-01": {"4. close": "211.40", "5. volume": "39981100"}
            }
        })
    }

    #[test]
    fn test_series_newest_first() {
        let points = parse_daily_series(&sample_series(), 30);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, "2026-08-05");
        assert_eq!(points[0].close, 214.05);
        assert_eq!(points[2].date, "2026-08-01");
    }

    #[test]
    fn test_series_truncated_to_max_points() {
        let points = parse_daily_series(&sample_series(), 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].date, "2026-08-04");
    }

    #[test]
    fn test_malformed_series_is_empty() {
        assert!(parse_daily_series(&json!({"note": "rate limited"}), 30).is_empty());
        assert!(parse_daily_series(&json!(null), 30).is_empty());
    }

    #[test]
    fn test_overview_placeholder_for_empty_object() {
        let normalized = normalize_overview(json!({}), "AAPL");
        assert_eq!(normalized["Symbol"], "AAPL");
    }

    #[test]
    fn test_overview_passthrough() {
        let raw = json!({"Symbol": "AAPL", "Name": "Apple Inc"});
        let normalized = normalize_overview(raw.clone(), "AAPL");
        assert_eq!(normalized, raw);
    }
}
