//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by admission decision and status
//! - `gate_request_duration_seconds` (histogram): latency of admitted requests
//! - `gate_active_connections` (gauge): connections holding an admission slot
//! - `gate_available_slots` (gauge): free admission slots
//! - `gate_tracked_clients` (gauge): clients in the registry after a sweep
//! - `gate_sweep_transitions_total` (counter): block/unblock/evict/enter transitions
//! - `gate_sweep_duration_seconds` (histogram): time spent per sweep tick
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op without an exporter
//! - Exporter is Prometheus, bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::clients::SweepReport;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(decision: &'static str, status: u16, start: Instant) {
    counter!(
        "gate_requests_total",
        "decision" => decision,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gate_request_duration_seconds", "decision" => decision)
        .record(start.elapsed().as_secs_f64());
}

/// Record admission slot usage.
pub fn record_slots(active: u64, available: usize) {
    gauge!("gate_active_connections").set(active as f64);
    gauge!("gate_available_slots").set(available as f64);
}

/// Record the outcome of a sweep tick.
pub fn record_sweep(report: &SweepReport, tracked: usize, start: Instant) {
    gauge!("gate_tracked_clients").set(tracked as f64);
    histogram!("gate_sweep_duration_seconds").record(start.elapsed().as_secs_f64());

    for (transition, count) in [
        ("blocked", report.blocked),
        ("unblocked", report.unblocked),
        ("evicted", report.evicted),
        ("entered", report.entered),
    ] {
        if count > 0 {
            counter!("gate_sweep_transitions_total", "transition" => transition)
                .increment(count as u64);
        }
    }
}
