//! Weather fetcher
//!
//! Resolves a place name to coordinates, then fetches current, hourly (24h)
//! and daily conditions from the forecast service. Numeric weather codes are
//! mapped to human-readable descriptions.

use crate::config::WeatherConfig;
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
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
    hourly: HourlyBlock,
    daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    apparent_temperature: f64,
    weather_code: u32,
    wind_speed_10m: f64,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<f64>,
    weather_code: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    weather_code: Vec<u32>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
}

pub struct WeatherFetcher {
    client: reqwest::Client,
    geocoding_endpoint: String,
    forecast_endpoint: String,
}

impl WeatherFetcher {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            geocoding_endpoint: config.geocoding_endpoint.clone(),
            forecast_endpoint: config.forecast_endpoint.clone(),
        })
    }

    pub async fn fetch(&self, location: &str) -> VisualizationResult {
        match self.fetch_inner(location).await {
            Ok(payload) => VisualizationResult::success(VisualizationKind::Weather, payload),
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Forecast failed");
                VisualizationResult::failure(VisualizationKind::Weather, e.to_string())
            }
        }
    }

    async fn fetch_inner(&self, location: &str) -> Result<serde_json::Value> {
        let place = self.geocode(location).await?;
        let forecast = self.forecast(place.latitude, place.longitude).await?;
        Ok(payload_from(&place, &forecast))
    }

    async fn geocode(&self, location: &str) -> Result<GeocodeHit> {
        let response = self
            .client
            .get(&self.geocoding_endpoint)
            .query(&[("name", location), ("count", "1")])
            .send()
            .await
            .map_err(|e| AppError::FetcherError {
                service: "forecast".to_string(),
                message: format!("Geocode request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::FetcherError {
                service: "forecast".to_string(),
                message: format!("Geocode API error {}", response.status()),
            });
        }

        let body: GeocodeResponse =
            response.json().await.map_err(|e| AppError::FetcherError {
                service: "forecast".to_string(),
                message: format!("Failed to parse geocode response: {}", e),
            })?;

        body.results.into_iter().next().ok_or_else(|| AppError::NotFound {
            resource_type: "location".to_string(),
            id: location.to_string(),
        })
    }

    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<ForecastResponse> {
        let response = self
            .client
            .get(&self.forecast_endpoint)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m"
                        .to_string(),
                ),
                ("hourly", "temperature_2m,weather_code".to_string()),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min".to_string(),
                ),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::FetcherError {
                service: "forecast".to_string(),
                message: format!("Forecast request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::FetcherError {
                service: "forecast".to_string(),
                message: format!("Forecast API error {}", response.status()),
            });
        }

        response.json().await.map_err(|e| AppError::FetcherError {
            service: "forecast".to_string(),
            message: format!("Failed to parse forecast response: {}", e),
        })
    }
}

fn payload_from(place: &GeocodeHit, forecast: &ForecastResponse) -> serde_json::Value {
    let hourly: Vec<serde_json::Value> = forecast
        .hourly
        .time
        .iter()
        .zip(&forecast.hourly.temperature_2m)
        .zip(&forecast.hourly.weather_code)
        .take(24)
        .map(|((time, temperature), code)| {
            json!({
                "time": time,
                "temperature": temperature,
                "description": describe_weather_code(*code),
            })
        })
        .collect();

    let daily: Vec<serde_json::Value> = forecast
        .daily
        .time
        .iter()
        .zip(&forecast.daily.temperature_2m_max)
        .zip(&forecast.daily.temperature_2m_min)
        .zip(&forecast.daily.weather_code)
        .map(|(((date, high), low), code)| {
            json!({
                "date": date,
                "high": high,
                "low": low,
                "description": describe_weather_code(*code),
            })
        })
        .collect();

    json!({
        "location": {
            "name": place.name,
            "country": place.country,
            "latitude": place.latitude,
            "longitude": place.longitude,
        },
        "current": {
            "temperature": forecast.current.temperature_2m,
            "feelsLike": forecast.current.apparent_temperature,
            "humidity": forecast.current.relative_humidity_2m,
            "windSpeed": forecast.current.wind_speed_10m,
            "description": describe_weather_code(forecast.current.weather_code),
        },
        "hourly": hourly,
        "daily": daily,
    })
}

/// WMO weather interpretation codes
fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_forecast(hours: usize) -> ForecastResponse {
        ForecastResponse {
            current: CurrentBlock {
                temperature_2m: 28.4,
                relative_humidity_2m: 64.0,
                apparent_temperature: 31.0,
                weather_code: 2,
                wind_speed_10m: 11.5,
            },
            hourly: HourlyBlock {
                time: (0..hours).map(|h| format!("2026-08-06T{:02}:00", h % 24)).collect(),
                temperature_2m: vec![25.0; hours],
                weather_code: vec![1; hours],
            },
            daily: DailyBlock {
                time: vec!["2026-08-06".to_string(), "2026-08-07".to_string()],
                weather_code: vec![3, 61],
                temperature_2m_max: vec![30.1, 27.8],
                temperature_2m_min: vec![22.3, 21.0],
            },
        }
    }

    fn sample_place() -> GeocodeHit {
        GeocodeHit {
            name: "Tokyo".to_string(),
            latitude: 35.6895,
            longitude: 139.6917,
            country: Some("Japan".to_string()),
        }
    }

    #[test]
    fn test_known_weather_codes() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(65), "Heavy rain");
        assert_eq!(describe_weather_code(95), "Thunderstorm");
    }

    #[test]
    fn test_unknown_weather_code() {
        assert_eq!(describe_weather_code(42), "Unknown");
    }

    #[test]
    fn test_hourly_capped_at_24() {
        let payload = payload_from(&sample_place(), &sample_forecast(48));
        assert_eq!(payload["hourly"].as_array().unwrap().len(), 24);
    }

    #[test]
    fn test_payload_shape() {
        let payload = payload_from(&sample_place(), &sample_forecast(6));
        assert_eq!(payload["location"]["name"], "Tokyo");
        assert_eq!(payload["current"]["description"], "Partly cloudy");
        assert_eq!(payload["daily"][1]["description"], "Slight rain");
        assert_eq!(payload["daily"][0]["high"], 30.1);
    }
}
