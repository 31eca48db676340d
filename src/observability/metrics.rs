//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Name and label the engine's counters and gauges
//! - Install the Prometheus exporter when enabled
//!
//! # Metrics
//! - `pool_acquire_total` (counter): pool lookups by outcome (hit, miss)
//! - `pool_release_total` (counter): releases by outcome (pooled, closed)
//! - `pool_connect_errors_total` (counter): connect failures by kind
//! - `pool_idle_connections` (gauge): idle entries across all buckets
//! - `server_requests_total` (counter): responses written, by status
//! - `server_active_connections` (gauge): open server connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library code records unconditionally
//! - Exporter installation is left to the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_acquire(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("pool_acquire_total", "outcome" => outcome).increment(1);
}

pub fn record_release(pooled: bool) {
    let outcome = if pooled { "pooled" } else { "closed" };
    metrics::counter!("pool_release_total", "outcome" => outcome).increment(1);
}

pub fn record_connect_error(kind: &'static str) {
    metrics::counter!("pool_connect_errors_total", "kind" => kind).increment(1);
}

pub fn record_idle_connections(count: usize) {
    metrics::gauge!("pool_idle_connections").set(count as f64);
}

pub fn record_response(status: u16) {
    metrics::counter!("server_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_active_connections(count: usize) {
    metrics::gauge!("server_active_connections").set(count as f64);
}
