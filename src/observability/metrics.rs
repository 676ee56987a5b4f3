//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mock_requests_total` (counter): requests by method, status
//! - `mock_request_duration_seconds` (histogram): dispatch latency
//! - `mock_mount_events_total` (counter): mount/unmount events
//! - `mock_route_table_entries` (gauge): entries in the current snapshot
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "mock_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("mock_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_mount_event(event: &'static str) {
    counter!("mock_mount_events_total", "event" => event).increment(1);
}

pub fn record_route_table_size(entries: usize) {
    gauge!("mock_route_table_entries").set(entries as f64);
}
