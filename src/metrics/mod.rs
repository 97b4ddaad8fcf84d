// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    REQUESTS_TOTAL,
    UPSTREAM_FETCH_DURATION,
    INFLIGHT_COALESCED,
    CACHE_OPERATIONS,
    LIFECYCLE_EVENTS,
    NAMESPACES_EVICTED,
    PUSH_MESSAGES,
};

/// Helper to record how an intercepted request was answered
pub fn record_request(class: &str, source: &str) {
    REQUESTS_TOTAL.with_label_values(&[class, source]).inc();
}

/// Helper to record one upstream attempt
pub fn record_upstream_fetch(class: &str, ok: bool, duration_secs: f64) {
    let outcome = if ok { "ok" } else { "failed" };
    UPSTREAM_FETCH_DURATION
        .with_label_values(&[class, outcome])
        .observe(duration_secs);
}

pub fn record_coalesced() {
    INFLIGHT_COALESCED.inc();
}

/// Helper to record cache operations
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_write(success: bool) {
    let operation = if success { "write" } else { "write_failure" };
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

/// Helper to record lifecycle events
pub fn record_lifecycle(event: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    LIFECYCLE_EVENTS.with_label_values(&[event, status]).inc();
}

pub fn record_evictions(count: usize) {
    NAMESPACES_EVICTED.inc_by(count as u64);
}

pub fn record_push(used_default: bool) {
    let payload = if used_default { "default" } else { "parsed" };
    PUSH_MESSAGES.with_label_values(&[payload]).inc();
}
