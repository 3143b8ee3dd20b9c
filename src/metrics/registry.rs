// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, GaugeVec, Opts, Registry, TextEncoder, Encoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_gauge_vec_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache lookups and writes per namespace
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations"),
        &["namespace", "operation"], // operation: hit, miss, store, store_failed, evict_before_retry
        REGISTRY
    ).unwrap();

    /// Entries removed by eviction
    pub static ref CACHE_EVICTIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_evictions_total", "Total cache entries evicted"),
        &["namespace", "reason"], // reason: expired, lru, cleared
        REGISTRY
    ).unwrap();

    /// Payload bytes currently cached
    pub static ref CACHE_BYTES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("cache_bytes_current", "Payload bytes currently cached"),
        &["namespace"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    /// Upstream fetches
    pub static ref UPSTREAM_FETCHES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_fetches_total", "Total upstream fetches"),
        &["kind", "outcome"], // kind: core, image, fallback, passthrough
        REGISTRY
    ).unwrap();

    /// Upstream fetch duration
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("upstream_fetch_duration_seconds", "Upstream fetch duration")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["kind"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // LISTING METRICS
    // ============================================================================

    /// Repository listing requests
    pub static ref LISTING_REQUESTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("listing_requests_total", "Total repository listing requests"),
        &["outcome"], // outcome: ok, empty, rate_limited, not_found, error
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
