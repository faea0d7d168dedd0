//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, pool size, evictions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `treeroute_requests_total` (counter): total requests by method, status
//! - `treeroute_request_duration_seconds` (histogram): latency distribution
//! - `treeroute_pool_workers` (gauge): live execution units
//! - `treeroute_worker_evictions_total` (counter): units removed after a non-zero exit
//! - `treeroute_middleware_timeouts_total` (counter): chains aborted by a slow middleware
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels for method and status code only

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, latency: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("treeroute_requests_total", &labels).increment(1);
    metrics::histogram!("treeroute_request_duration_seconds", &labels)
        .record(latency.as_secs_f64());
}

pub fn set_pool_size(size: usize) {
    metrics::gauge!("treeroute_pool_workers").set(size as f64);
}

pub fn record_eviction(code: i32) {
    metrics::counter!("treeroute_worker_evictions_total", "code" => code.to_string()).increment(1);
}

pub fn record_middleware_timeout() {
    metrics::counter!("treeroute_middleware_timeouts_total").increment(1);
}
