//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Beacon metrics
pub const METRICS_PREFIX: &str = "beacon";

/// Histogram buckets for pipeline latency (in seconds). The pipeline is
/// dominated by external calls, so the buckets run well past typical
/// HTTP-handler targets.
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    20.00, // 20s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total pipeline runs"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end pipeline latency in seconds"
    );

    describe_gauge!(
        format!("{}_pipeline_results_count", METRICS_PREFIX),
        Unit::Count,
        "Aggregated results produced by the last pipeline run"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generation service calls"
    );

    // Fetcher metrics
    describe_counter!(
        format!("{}_fetcher_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total auxiliary data fetcher calls"
    );

    tracing::info!("Metrics registered");
}

/// Record one pipeline run
pub fn record_pipeline(mode: &str, duration_secs: f64, result_count: usize) {
    counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_pipeline_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Record one generation call by pipeline stage
pub fn record_generation(stage: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record one auxiliary fetcher call
pub fn record_fetcher(service: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_fetcher_requests_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
