//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (requests, latency, faults, registrations)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by status and alias
//! - `router_request_duration_seconds` (histogram): latency distribution
//! - `router_faults_total` (counter): handler/filter faults by source
//! - `router_registrations_total` (counter): register/unregister operations
//! - `router_registered_aliases` (gauge): current table size
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op (tests, embedding)
//! - Alias label is the matched alias, or `none` for 404/503

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, alias: &str, start: Instant) {
    let status = status.to_string();
    counter!("router_requests_total", "status" => status.clone(), "alias" => alias.to_string()).increment(1);
    histogram!("router_request_duration_seconds", "status" => status).record(start.elapsed().as_secs_f64());
}

pub fn record_fault(source: &'static str) {
    counter!("router_faults_total", "source" => source).increment(1);
}

pub fn record_registration(op: &'static str) {
    counter!("router_registrations_total", "op" => op).increment(1);
}

pub fn record_registered_aliases(count: usize) {
    gauge!("router_registered_aliases").set(count as f64);
}
