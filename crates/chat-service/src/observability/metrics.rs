//! Prometheus metrics for the chat service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `chat_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `identity`: authenticated, anonymous
//! - `reason`: fixed strings chosen at the call site
//! - `operation`: save, recent
//! - `status`: success, error, timeout

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("chat_persistence".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set persistence buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("chat_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("chat_broadcast_fanout".to_string()),
            &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
        )
        .map_err(|e| format!("Failed to set fanout buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Session Lifecycle Metrics
// ============================================================================

/// Metric: `chat_active_sessions` (gauge)
pub fn set_active_sessions(count: usize) {
    gauge!("chat_active_sessions").set(count as f64);
}

/// Metric: `chat_sessions_registered_total`
/// Labels: `identity`
pub fn record_session_registered(authenticated: bool) {
    let identity = if authenticated {
        "authenticated"
    } else {
        "anonymous"
    };
    counter!("chat_sessions_registered_total", "identity" => identity).increment(1);
}

/// Metric: `chat_sessions_removed_total`
/// Labels: `reason` (unregister, slow_consumer, closed, shutdown)
pub fn record_session_removed(reason: &'static str) {
    counter!("chat_sessions_removed_total", "reason" => reason).increment(1);
}

/// Metric: `chat_upgrades_total`
/// Labels: `outcome` (accepted, forbidden_origin, identity_error)
pub fn record_upgrade(outcome: &'static str) {
    counter!("chat_upgrades_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Fan-out Metrics
// ============================================================================

/// Record one processed broadcast and how many sessions it reached.
///
/// Metric: `chat_broadcasts_total`, `chat_broadcast_fanout`
pub fn record_broadcast(recipients: usize) {
    counter!("chat_broadcasts_total").increment(1);
    histogram!("chat_broadcast_fanout").record(recipients as f64);
}

/// Producer side: the hub broadcast queue was full and a message was dropped.
///
/// Metric: `chat_broadcast_dropped_total`
pub fn record_broadcast_dropped() {
    counter!("chat_broadcast_dropped_total").increment(1);
}

/// Metric: `chat_history_replays_total`, `chat_history_replayed_messages_total`
/// Labels: `status`
pub fn record_history_replay(status: &'static str, messages: usize) {
    counter!("chat_history_replays_total", "status" => status).increment(1);
    counter!("chat_history_replayed_messages_total").increment(messages as u64);
}

/// Inbound frame that was answered with an error envelope.
///
/// Metric: `chat_inbound_rejections_total`
/// Labels: `reason` (decode, unauthenticated, empty, persist)
pub fn record_inbound_rejection(reason: &'static str) {
    counter!("chat_inbound_rejections_total", "reason" => reason).increment(1);
}

// ============================================================================
// Persistence Metrics
// ============================================================================

/// Record a persistence call made through the chat service (timeout included).
///
/// Metric: `chat_persistence_duration_seconds`, `chat_persistence_total`
/// Labels: `operation`, `status`
pub fn record_persistence(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("chat_persistence_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());

    counter!("chat_persistence_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record a raw database query.
///
/// Metric: `chat_db_query_duration_seconds`, `chat_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("chat_db_query_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());

    counter!("chat_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
