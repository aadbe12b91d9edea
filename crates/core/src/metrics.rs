//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue consumption and engine dispatch
//! - Event bridge traffic
//! - Live broadcast fan-out

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Dispatcher Metrics
// =============================================================================

/// Queue messages consumed by result.
pub static QUEUE_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "superres_queue_messages_total",
            "Total queue messages consumed",
        ),
        &["result"], // "dispatched", "completed", "malformed", "read_error"
    )
    .unwrap()
});

/// Engine submissions by outcome.
pub static ENGINE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "superres_engine_requests_total",
            "Total task submissions to the processing engine",
        ),
        &["status"], // "created", "rejected", "error"
    )
    .unwrap()
});

/// Engine submission duration in seconds.
pub static ENGINE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "superres_engine_request_duration_seconds",
            "Duration of task submissions to the processing engine",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Bridge Metrics
// =============================================================================

/// Events received from the engine channels.
pub static BRIDGE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "superres_bridge_events_total",
            "Total events received from engine channels",
        ),
        &["channel", "result"], // channel: "completion", "progress"; result: "relayed", "dropped"
    )
    .unwrap()
});

/// Subscription failures that triggered a resubscribe.
pub static BRIDGE_RESUBSCRIBES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "superres_bridge_resubscribes_total",
            "Total event channel resubscriptions after transport errors",
        ),
        &["channel"],
    )
    .unwrap()
});

/// Tasks moved to the completed set.
pub static TASKS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("superres_tasks_completed_total", "Total tasks completed").unwrap()
});

// =============================================================================
// Broadcast Metrics
// =============================================================================

/// Messages handed to viewer sessions.
pub static BROADCAST_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "superres_broadcast_delivered_total",
        "Total messages delivered to viewer sessions",
    )
    .unwrap()
});

/// Messages dropped because a viewer's buffer was full.
pub static BROADCAST_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "superres_broadcast_dropped_total",
        "Total messages dropped for slow viewer sessions",
    )
    .unwrap()
});

/// Sessions removed during fan-out because their receiver was gone.
pub static BROADCAST_PRUNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "superres_broadcast_pruned_total",
        "Total disconnected viewer sessions pruned during fan-out",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatcher
        Box::new(QUEUE_MESSAGES_TOTAL.clone()),
        Box::new(ENGINE_REQUESTS_TOTAL.clone()),
        Box::new(ENGINE_REQUEST_DURATION.clone()),
        // Bridge
        Box::new(BRIDGE_EVENTS_TOTAL.clone()),
        Box::new(BRIDGE_RESUBSCRIBES_TOTAL.clone()),
        Box::new(TASKS_COMPLETED.clone()),
        // Broadcast
        Box::new(BROADCAST_DELIVERED.clone()),
        Box::new(BROADCAST_DROPPED.clone()),
        Box::new(BROADCAST_PRUNED.clone()),
    ]
}
