//! Prometheus Metrics Module
//!
//! Pre-registered metrics for the reconciliation loops.

use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};

lazy_static! {
    // --- Order Metrics ---

    /// Placement attempts (by exchange, outcome)
    pub static ref ORDER_PLACEMENTS: IntCounterVec = register_int_counter_vec!(
        opts!("orderkeeper_order_placements_total", "Order placement attempts"),
        &["exchange", "outcome"]
    ).expect("FATAL: Failed to register ORDER_PLACEMENTS metric - check for duplicate registration");

    /// Status queries (by exchange, outcome)
    pub static ref ORDER_STATUS_QUERIES: IntCounterVec = register_int_counter_vec!(
        opts!("orderkeeper_order_status_queries_total", "Order status queries against the venue"),
        &["exchange", "outcome"]
    ).expect("FATAL: Failed to register ORDER_STATUS_QUERIES metric - check for duplicate registration");

    /// Persisted order status transitions
    pub static ref ORDER_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        opts!("orderkeeper_order_transitions_total", "Order status transitions"),
        &["to_status"]
    ).expect("FATAL: Failed to register ORDER_TRANSITIONS metric - check for duplicate registration");

    // --- Position Metrics ---

    /// Positions whose entry orders were created
    pub static ref POSITIONS_ENTERED: IntCounterVec = register_int_counter_vec!(
        opts!("orderkeeper_positions_entered_total", "Positions with entry orders placed"),
        &["exchange"]
    ).expect("FATAL: Failed to register POSITIONS_ENTERED metric - check for duplicate registration");

    // --- Loop Metrics ---

    /// Reconciliation tick duration in seconds
    pub static ref TICK_DURATION: HistogramVec = register_histogram_vec!(
        "orderkeeper_reconcile_tick_seconds",
        "Reconciliation tick duration",
        &["task"],
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    ).expect("FATAL: Failed to register TICK_DURATION metric - check for duplicate registration");
}

/// Record a placement attempt
pub fn record_placement(exchange: &str, outcome: &str) {
    ORDER_PLACEMENTS
        .with_label_values(&[exchange, outcome])
        .inc();
}

/// Record a status query
pub fn record_status_query(exchange: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    ORDER_STATUS_QUERIES
        .with_label_values(&[exchange, outcome])
        .inc();
}

/// Record a persisted order status change
pub fn record_transition(to_status: &str) {
    ORDER_TRANSITIONS.with_label_values(&[to_status]).inc();
}

/// Record a position whose entries were placed
pub fn record_position_entered(exchange: &str) {
    POSITIONS_ENTERED.with_label_values(&[exchange]).inc();
}

/// Record tick duration
pub fn record_tick_duration(task: &str, secs: f64) {
    TICK_DURATION.with_label_values(&[task]).observe(secs);
}

/// Get metrics as text in Prometheus exposition format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode Prometheus metrics: {}", e);
        return String::new();
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Prometheus metrics buffer is not valid UTF-8: {}", e);
            String::new()
        }
    }
}
