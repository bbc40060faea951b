//! Metrics collection and exposition.
//!
//! # Metrics
//! - `domain_gate_requests_total` (counter): requests by method, status, verdict
//! - `domain_gate_request_duration_seconds` (histogram): end-to-end latency
//! - `domain_gate_cache_events_total` (counter): hit / miss / stale
//! - `domain_gate_lookups_total` (counter): lookup outcome (status code or "error")
//! - `domain_gate_cache_entries` (gauge): entries currently cached
//!
//! Without an installed recorder every call is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed proxied request.
pub fn record_request(method: &str, status: u16, verdict: &'static str, start: Instant) {
    metrics::counter!(
        "domain_gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "verdict" => verdict
    )
    .increment(1);
    metrics::histogram!("domain_gate_request_duration_seconds", "verdict" => verdict)
        .record(start.elapsed().as_secs_f64());
}

/// Record a cache hit, miss or stale eviction.
pub fn record_cache_event(event: &'static str) {
    metrics::counter!("domain_gate_cache_events_total", "event" => event).increment(1);
}

/// Record the outcome of a call to the lookup service.
pub fn record_lookup(outcome: &str) {
    metrics::counter!("domain_gate_lookups_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the current number of cache entries.
pub fn record_cache_size(entries: usize) {
    metrics::gauge!("domain_gate_cache_entries").set(entries as f64);
}
