//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_sessions_total` (counter): finished or refused sessions by outcome
//! - `tunnel_active_sessions` (gauge): sessions currently running
//! - `tunnel_busy_workers` (gauge): extraction workers in use
//! - `tunnel_fetches_total` (counter): fetch exchanges by outcome
//! - `tunnel_fetch_duration_seconds` (histogram): fetch round-trip latency
//! - `tunnel_rejected_total` (counter): connections refused before upgrade, by reason
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
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session(outcome: &'static str) {
    counter!("tunnel_sessions_total", "outcome" => outcome).increment(1);
}

pub fn set_active_sessions(count: u64) {
    gauge!("tunnel_active_sessions").set(count as f64);
}

pub fn set_busy_workers(count: usize) {
    gauge!("tunnel_busy_workers").set(count as f64);
}

pub fn record_fetch(outcome: &'static str, start: Instant) {
    counter!("tunnel_fetches_total", "outcome" => outcome).increment(1);
    histogram!("tunnel_fetch_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejected(reason: &'static str) {
    counter!("tunnel_rejected_total", "reason" => reason).increment(1);
}
