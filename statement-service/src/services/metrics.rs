//! Prometheus metrics for statement-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Provider HTTP calls by endpoint and outcome status.
pub static PROVIDER_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "statement_provider_requests_total",
        "Total number of bank provider requests",
        &["endpoint", "status"]
    )
    .expect("Failed to register provider_requests_total")
});

pub static PROVIDER_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "statement_provider_request_duration_seconds",
        "Bank provider request duration in seconds",
        &["endpoint"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]
    )
    .expect("Failed to register provider_request_duration")
});

/// Aggregation attempts. No user or account labels.
pub static AGGREGATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "statement_aggregations_total",
        "Total number of statement aggregations",
        &["mode", "outcome"] // text|report|balances, ok|rate_limited|error
    )
    .expect("Failed to register aggregations_total")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "statement_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PROVIDER_REQUESTS_TOTAL);
    Lazy::force(&PROVIDER_REQUEST_DURATION);
    Lazy::force(&AGGREGATIONS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
