//! Prometheus metrics for the fees service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Payments created, by plan and item.
pub static PAYMENTS_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_payments_created_total",
        "Total payments created",
        &["plan", "plan_item"]
    )
    .expect("Failed to register payments_created_total")
});

/// Status transitions that actually landed, by destination status.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_transitions_total",
        "Total payment status transitions",
        &["to_status"]
    )
    .expect("Failed to register transitions_total")
});

/// Receipts issued, by plan item.
pub static RECEIPTS_ISSUED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_receipts_issued_total",
        "Total receipts issued",
        &["plan_item"]
    )
    .expect("Failed to register receipts_issued_total")
});

/// Settlement gateway calls, by gateway and result.
pub static GATEWAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_gateway_requests_total",
        "Total settlement gateway requests",
        &["gateway", "result"]
    )
    .expect("Failed to register gateway_requests_total")
});

/// Change feed events published, by operation.
pub static FEED_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_feed_events_total",
        "Total change feed events published",
        &["op"]
    )
    .expect("Failed to register feed_events_total")
});

/// Full view resyncs performed by stream consumers, by reason.
pub static STREAM_RESYNCS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_stream_resyncs_total",
        "Total full refetches by stream consumers",
        &["reason"] // insert, missing_row, lagged
    )
    .expect("Failed to register stream_resyncs_total")
});

/// Debounced aggregate recomputations, by stream scope.
pub static AGGREGATE_RECOMPUTES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_aggregate_recomputes_total",
        "Total aggregate recomputations",
        &["scope"]
    )
    .expect("Failed to register aggregate_recomputes_total")
});

/// Schedule cache lookups, by result.
pub static CATALOG_LOOKUPS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fees_catalog_lookups_total",
        "Fee schedule cache lookups",
        &["result"] // hit, miss
    )
    .expect("Failed to register catalog_lookups")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fees_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PAYMENTS_CREATED_TOTAL);
    Lazy::force(&TRANSITIONS_TOTAL);
    Lazy::force(&RECEIPTS_ISSUED_TOTAL);
    Lazy::force(&GATEWAY_REQUESTS_TOTAL);
    Lazy::force(&FEED_EVENTS_TOTAL);
    Lazy::force(&STREAM_RESYNCS_TOTAL);
    Lazy::force(&AGGREGATE_RECOMPUTES_TOTAL);
    Lazy::force(&CATALOG_LOOKUPS);
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
