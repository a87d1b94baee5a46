//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connection gauge
//! - Message submissions by outcome
//! - Fan-out deliveries skipped because the target vanished
//! - Message persistence latency histogram
//! - Protocol errors by event

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of registered WebSocket connections",
        )
        .namespace("chat_sync"),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Message submissions by terminal outcome
pub static MESSAGES_SUBMITTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_submitted_total", "Message submissions by outcome")
            .namespace("chat_sync"),
        &["outcome"], // "accepted", "validation", "persistence"
    )
    .expect("Failed to create MESSAGES_SUBMITTED_TOTAL metric")
});

/// Deliveries skipped because the target connection was gone
pub static DELIVERY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "delivery_failures_total",
            "Events dropped because the target connection vanished",
        )
        .namespace("chat_sync"),
    )
    .expect("Failed to create DELIVERY_FAILURES_TOTAL metric")
});

/// Malformed or rejected client events
pub static PROTOCOL_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("protocol_errors_total", "Client events dropped as protocol errors")
            .namespace("chat_sync"),
        &["event"],
    )
    .expect("Failed to create PROTOCOL_ERRORS_TOTAL metric")
});

/// Message persistence latency histogram
pub static PERSIST_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];
    Histogram::with_opts(
        HistogramOpts::new(
            "persist_duration_seconds",
            "Message store write latency in seconds",
        )
        .namespace("chat_sync")
        .buckets(buckets),
    )
    .expect("Failed to create PERSIST_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(MESSAGES_SUBMITTED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_SUBMITTED_TOTAL");
    registry
        .register(Box::new(DELIVERY_FAILURES_TOTAL.clone()))
        .expect("Failed to register DELIVERY_FAILURES_TOTAL");
    registry
        .register(Box::new(PROTOCOL_ERRORS_TOTAL.clone()))
        .expect("Failed to register PROTOCOL_ERRORS_TOTAL");
    registry
        .register(Box::new(PERSIST_DURATION_SECONDS.clone()))
        .expect("Failed to register PERSIST_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to update the WebSocket connection count
pub fn set_websocket_connections(connected: i64) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(connected);
}

/// Helper to record a submission outcome
pub fn record_submission(outcome: &str) {
    MESSAGES_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record a skipped delivery
pub fn record_delivery_failure() {
    DELIVERY_FAILURES_TOTAL.inc();
}

/// Helper to record a dropped client event
pub fn record_protocol_error(event: &str) {
    PROTOCOL_ERRORS_TOTAL.with_label_values(&[event]).inc();
}

/// Helper to record store write latency
pub fn record_persist(duration_secs: f64) {
    PERSIST_DURATION_SECONDS.observe(duration_secs);
}
