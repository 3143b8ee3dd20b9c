// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    CACHE_BYTES,
    CACHE_EVICTIONS,
    CACHE_OPERATIONS,
    LISTING_REQUESTS,
    UPSTREAM_DURATION,
    UPSTREAM_FETCHES,
};

/// Helper to record a cache lookup or write
pub fn record_cache_op(namespace: &str, operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[namespace, operation]).inc();
}

/// Helper to record evicted entries
pub fn record_eviction(namespace: &str, reason: &str, count: usize) {
    CACHE_EVICTIONS
        .with_label_values(&[namespace, reason])
        .inc_by(count as f64);
}

pub fn update_cache_bytes(namespace: &str, bytes: u64) {
    CACHE_BYTES.with_label_values(&[namespace]).set(bytes as f64);
}

/// Helper to record an upstream fetch
pub fn record_upstream(kind: &str, outcome: &str, duration_secs: f64) {
    UPSTREAM_FETCHES.with_label_values(&[kind, outcome]).inc();
    UPSTREAM_DURATION
        .with_label_values(&[kind])
        .observe(duration_secs);
}

pub fn record_listing(outcome: &str) {
    LISTING_REQUESTS.with_label_values(&[outcome]).inc();
}
