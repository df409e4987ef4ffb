//! Prometheus metrics for the tracking cookie proxy.
//!
//! Tracks tagged-traffic inspection, leak detection, cookie injection, and
//! the health of the pending request index.
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use tracing::warn;

lazy_static! {
    /// Requests seen by the inspector, split by read-cookie tagging
    pub static ref REQUESTS_INSPECTED_TOTAL: CounterVec = register_counter_vec!(
        "pto_requests_inspected_total",
        "Total number of requests inspected for tracking cookies",
        &["tagged"]  // tagged: true|false
    )
    .unwrap();

    /// Newly recorded (session, host) leak pairs
    pub static ref LEAKS_RECORDED_TOTAL: Counter = register_counter!(
        "pto_leaks_recorded_total",
        "Total number of distinct session/host cookie leaks recorded"
    )
    .unwrap();

    pub static ref COOKIES_INJECTED_TOTAL: Counter = register_counter!(
        "pto_cookies_injected_total",
        "Total number of tracking cookies injected into responses"
    )
    .unwrap();

    pub static ref PENDING_EVICTIONS_TOTAL: CounterVec = register_counter_vec!(
        "pto_pending_evictions_total",
        "Pending request entries evicted without a matching response",
        &["reason"]  // reason: ttl|capacity
    )
    .unwrap();

    pub static ref PENDING_ENTRIES: Gauge = register_gauge!(
        "pto_pending_entries",
        "Current number of entries in the pending request index"
    )
    .unwrap();

    /// Responses that arrived with no pending request to correlate against
    pub static ref ORPHAN_RESPONSES_TOTAL: Counter = register_counter!(
        "pto_orphan_responses_total",
        "Total number of responses with no pending request entry"
    )
    .unwrap();

    pub static ref UPSTREAM_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "pto_upstream_failures_total",
        "Total number of upstream exchanges that failed",
        &["scheme"]
    )
    .unwrap();

    /// Upstream request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "pto_upstream_request_duration_ms",
        "Duration of upstream requests until response headers",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_inspection(read_tagged: bool) {
    REQUESTS_INSPECTED_TOTAL
        .with_label_values(&[if read_tagged { "true" } else { "false" }])
        .inc();
}

pub fn record_leak() {
    LEAKS_RECORDED_TOTAL.inc();
}

pub fn record_cookie_injected() {
    COOKIES_INJECTED_TOTAL.inc();
}

pub fn record_orphan_response() {
    ORPHAN_RESPONSES_TOTAL.inc();
}

pub fn record_pending_eviction(reason: &str, count: usize) {
    PENDING_EVICTIONS_TOTAL
        .with_label_values(&[reason])
        .inc_by(count as f64);
}

pub fn set_pending_entries(len: usize) {
    PENDING_ENTRIES.set(len as f64);
}

pub fn record_upstream_failure(scheme: &str) {
    UPSTREAM_FAILURES_TOTAL.with_label_values(&[scheme]).inc();
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}
