//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the upscaling server:
//! - HTTP request metrics (latency, counts, errors)
//! - Live viewer (SSE) session metrics
//! - Task submission and processing set size (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "superres_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("superres_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "superres_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Viewer Session Metrics
// =============================================================================

/// Active SSE viewer sessions.
pub static SSE_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "superres_sse_sessions_active",
        "Number of connected live viewers",
    )
    .unwrap()
});

/// Total SSE viewer sessions (cumulative).
pub static SSE_SESSIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "superres_sse_sessions_total",
        "Total live viewer sessions since startup",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Task submissions by result.
pub static TASKS_SUBMITTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("superres_tasks_submitted_total", "Total task submissions"),
        &["result"], // "queued", "duplicate", "rejected", "failed"
    )
    .unwrap()
});

/// Tasks in the processing set (collected dynamically).
pub static TASKS_PROCESSING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "superres_tasks_processing",
        "Number of tasks currently processing",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server_metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // HTTP
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        // Viewers
        Box::new(SSE_SESSIONS_ACTIVE.clone()),
        Box::new(SSE_SESSIONS_TOTAL.clone()),
        // Tasks
        Box::new(TASKS_SUBMITTED_TOTAL.clone()),
        Box::new(TASKS_PROCESSING.clone()),
    ];

    // Core metrics (dispatcher, bridge, broadcast)
    for metric in server_metrics
        .into_iter()
        .chain(superres_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    match state.registry().list_status().await {
        Ok(status) => TASKS_PROCESSING.set(status.processing.len() as i64),
        Err(e) => warn!("Failed to read processing set for metrics: {}", e),
    }
}
