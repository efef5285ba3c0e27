//! Configuration management for Beacon
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Text-generation capability
    pub generation: GenerationConfig,

    /// Web-search capability
    pub search: SearchConfig,

    /// Geocoding service
    pub geocoding: GeocodingConfig,

    /// Market-data service
    pub financial: FinancialConfig,

    /// Forecast service
    pub weather: WeatherConfig,

    /// Relevance scoring
    pub relevance: RelevanceConfig,

    /// Pipeline tuning
    pub pipeline: PipelineConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Chat completions endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// API key for the generation service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// API key for the search service
    pub api_key: Option<String>,

    /// Maximum results per underlying call (capped at 10)
    #[serde(default = "default_results_per_call")]
    pub results_per_call: usize,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeocodingConfig {
    /// Geocoding endpoint
    #[serde(default = "default_geocoding_endpoint")]
    pub endpoint: String,

    /// API key for the geocoding service
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinancialConfig {
    /// Market-data endpoint
    #[serde(default = "default_financial_endpoint")]
    pub endpoint: String,

    /// API key for the market-data service
    pub api_key: Option<String>,

    /// Maximum daily series points
    #[serde(default = "default_series_points")]
    pub series_points: usize,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeatherConfig {
    /// Place-name geocoding endpoint of the forecast provider
    #[serde(default = "default_weather_geocoding_endpoint")]
    pub geocoding_endpoint: String,

    /// Forecast endpoint
    #[serde(default = "default_forecast_endpoint")]
    pub forecast_endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelevanceConfig {
    /// Domains treated as high quality in addition to the
    /// .gov/.edu/.org suffix rule
    #[serde(default = "default_quality_domains")]
    pub quality_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Maximum sub-queries requested from decomposition
    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,

    /// Maximum results fed into synthesis
    #[serde(default = "default_max_context_results")]
    pub max_context_results: usize,

    /// Recent messages fed back into prompts
    #[serde(default = "default_recency_window")]
    pub recency_window: u64,

    /// Minimum classifier confidence before a fetcher is invoked
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_generation_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> usize { 1500 }
fn default_temperature() -> f32 { 0.7 }
fn default_generation_timeout() -> u64 { 30 }
fn default_search_endpoint() -> String { "https://google.serper.dev/search".to_string() }
fn default_results_per_call() -> usize { 10 }
fn default_external_timeout() -> u64 { 10 }
fn default_geocoding_endpoint() -> String { "https://maps.googleapis.com/maps/api/geocode/json".to_string() }
fn default_financial_endpoint() -> String { "https://www.alphavantage.co/query".to_string() }
fn default_series_points() -> usize { 30 }
fn default_weather_geocoding_endpoint() -> String { "https://geocoding-api.open-meteo.com/v1/search".to_string() }
fn default_forecast_endpoint() -> String { "https://api.open-meteo.com/v1/forecast".to_string() }
fn default_max_sub_queries() -> usize { 5 }
fn default_max_context_results() -> usize { 15 }
fn default_recency_window() -> u64 { 3 }
fn default_confidence_threshold() -> f64 { 0.7 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "beacon".to_string() }

fn default_quality_domains() -> Vec<String> {
    [
        "reuters.com",
        "apnews.com",
        "bbc.com",
        "nature.com",
        "sciencedirect.com",
        "nih.gov",
        "who.int",
        "economist.com",
        "ft.com",
        "bloomberg.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/beacon".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            generation: GenerationConfig {
                endpoint: default_generation_endpoint(),
                api_key: None,
                model: default_generation_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_secs: default_generation_timeout(),
            },
            search: SearchConfig {
                endpoint: default_search_endpoint(),
                api_key: None,
                results_per_call: default_results_per_call(),
                timeout_secs: default_external_timeout(),
            },
            geocoding: GeocodingConfig {
                endpoint: default_geocoding_endpoint(),
                api_key: None,
                timeout_secs: default_external_timeout(),
            },
            financial: FinancialConfig {
                endpoint: default_financial_endpoint(),
                api_key: None,
                series_points: default_series_points(),
                timeout_secs: default_external_timeout(),
            },
            weather: WeatherConfig {
                geocoding_endpoint: default_weather_geocoding_endpoint(),
                forecast_endpoint: default_forecast_endpoint(),
                timeout_secs: default_external_timeout(),
            },
            relevance: RelevanceConfig {
                quality_domains: default_quality_domains(),
            },
            pipeline: PipelineConfig {
                max_sub_queries: default_max_sub_queries(),
                max_context_results: default_max_context_results(),
                recency_window: default_recency_window(),
                confidence_threshold: default_confidence_threshold(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}
