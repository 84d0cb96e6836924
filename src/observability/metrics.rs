//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): `/generate` responses by status
//! - `gateway_rate_limited_total` (counter): requests rejected with 429
//! - `gateway_upstream_duration_seconds` (histogram): upstream call latency by outcome
//! - `gateway_upstream_errors_total` (counter): failed upstream calls by kind
//! - `gateway_worker_restarts_total` (counter): replacement workers spawned
//! - `gateway_worker_crash_loops_total` (counter): slots abandoned by the crash-loop breaker
//!
//! Every process has its own recorder. Worker `i` exposes its registry on
//! `metrics_port + i`; the supervisor uses the port after the last worker.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(status: u16) {
    counter!("gateway_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_upstream(outcome: &'static str, started: Instant) {
    histogram!("gateway_upstream_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
    if outcome != "ok" {
        counter!("gateway_upstream_errors_total", "kind" => outcome).increment(1);
    }
}

pub fn record_worker_restart(slot: usize) {
    counter!("gateway_worker_restarts_total", "slot" => slot.to_string()).increment(1);
}

pub fn record_crash_loop(slot: usize) {
    counter!("gateway_worker_crash_loops_total", "slot" => slot.to_string()).increment(1);
}

pub fn record_live_workers(live: usize) {
    gauge!("gateway_live_workers").set(live as f64);
}
