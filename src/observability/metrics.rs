//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): client requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `offload_total` (counter): intercepted responses by outcome
//! - `offload_duration_seconds` (histogram): time until offload headers arrived
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter only runs when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished client request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record what happened to an intercepted backend response.
pub fn record_offload(outcome: &'static str) {
    metrics::counter!("offload_total", "outcome" => outcome).increment(1);
}

pub fn record_offload_duration(start: Instant) {
    metrics::histogram!("offload_duration_seconds").record(start.elapsed().as_secs_f64());
}
