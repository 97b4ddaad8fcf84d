// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, IntCounter, Opts, Registry, TextEncoder, Encoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Intercepted requests by class and by where the answer came from
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("requests_total", "Total number of intercepted requests"),
        &["class", "source"], // source: network, cache, offline-page, synthetic, empty
        REGISTRY
    ).unwrap();

    /// Upstream attempt duration, including failed attempts
    pub static ref UPSTREAM_FETCH_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("upstream_fetch_duration_seconds", "Upstream fetch duration in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["class", "outcome"], // outcome: ok, failed
        REGISTRY
    ).unwrap();

    /// Requests that joined an upstream call already in flight
    pub static ref INFLIGHT_COALESCED: IntCounter = register_int_counter_with_registry!(
        Opts::new("inflight_coalesced_total", "Requests served by a shared in-flight upstream call"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, write, write_failure
        REGISTRY
    ).unwrap();

    // ============================================================================
    // LIFECYCLE METRICS
    // ============================================================================

    /// Install / activate / resume events
    pub static ref LIFECYCLE_EVENTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("lifecycle_events_total", "Total generation lifecycle events"),
        &["event", "status"], // status: success, failure
        REGISTRY
    ).unwrap();

    /// Namespaces removed during activation
    pub static ref NAMESPACES_EVICTED: IntCounter = register_int_counter_with_registry!(
        Opts::new("namespaces_evicted_total", "Total namespaces evicted on activation"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // PUSH METRICS
    // ============================================================================

    /// Push messages by payload origin
    pub static ref PUSH_MESSAGES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("push_messages_total", "Total push messages handled"),
        &["payload"], // payload: parsed, default
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
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Vec collectors only show up once a label set has been used
        REQUESTS_TOTAL.with_label_values(&["generic", "network"]).inc();
        CACHE_OPERATIONS.with_label_values(&["hit"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("requests_total"));
        assert!(metrics.contains("cache_operations_total"));
        assert!(metrics.contains("namespaces_evicted_total"));
        assert!(metrics.contains("inflight_coalesced_total"));
    }
}
