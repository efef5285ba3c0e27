//! Geographic fetcher
//!
//! Resolves a free-text place name to coordinates via a geocoding lookup.

use crate::config::GeocodingConfig;
use crate::errors::{AppError, Result};
use crate::fetchers::{VisualizationKind, VisualizationResult};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeHit>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    formatted_address: String,
    place_id: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
    location_type: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

pub struct GeographicFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeographicFetcher {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
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

    /// Resolve a place name. Idempotent against an unchanged upstream.
    pub async fn fetch(&self, location: &str) -> VisualizationResult {
        match self.fetch_inner(location).await {
            Ok(payload) => VisualizationResult::success(VisualizationKind::Geographic, payload),
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Geocoding failed");
                VisualizationResult::failure(VisualizationKind::Geographic, e.to_string())
            }
        }
    }

    async fn fetch_inner(&self, location: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", location), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AppError::FetcherError {
                service: "geocoding".to_string(),
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::FetcherError {
                service: "geocoding".to_string(),
                message: format!("API error {}", response.status()),
            });
        }

        let body: GeocodeResponse =
            response.json().await.map_err(|e| AppError::FetcherError {
                service: "geocoding".to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        payload_from(location, body)
    }
}

fn payload_from(location: &str, body: GeocodeResponse) -> Result<serde_json::Value> {
    let hit = body.results.into_iter().next().ok_or_else(|| AppError::NotFound {
        resource_type: "location".to_string(),
        id: location.to_string(),
    })?;

    Ok(json!({
        "lat": hit.geometry.location.lat,
        "lng": hit.geometry.location.lng,
        "formattedAddress": hit.formatted_address,
        "placeId": hit.place_id,
        "locationType": hit.geometry.location_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> GeocodeResponse {
        serde_json::from_str(
            r#"{
                "results": [{
                    "formatted_address": "Tokyo, Japan",
                    "place_id": "ChIJ51cu8IcbXWAR",
                    "geometry": {
                        "location": {"lat": 35.6764, "lng": 139.6500},
                        "location_type": "APPROXIMATE"
                    }
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let payload = payload_from("Tokyo", sample_response()).unwrap();
        assert_eq!(payload["lat"], 35.6764);
        assert_eq!(payload["lng"], 139.65);
        assert_eq!(payload["formattedAddress"], "Tokyo, Japan");
        assert_eq!(payload["locationType"], "APPROXIMATE");
    }

    #[test]
    fn test_zero_matches_is_not_found() {
        let empty: GeocodeResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        let err = payload_from("Nowhereville", empty).unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn test_payload_is_deterministic() {
        let a = payload_from("Tokyo", sample_response()).unwrap();
        let b = payload_from("Tokyo", sample_response()).unwrap();
        assert_eq!(a, b);
    }
}
