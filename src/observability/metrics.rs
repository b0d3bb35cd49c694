//! Metrics collection and exposition.
//!
//! # Metrics
//! - `access_guard_decisions_total` (counter): decisions by outcome
//!   (`permit`, `deny`, `challenge`, `error`)
//! - `access_guard_challenges_total` (counter): challenges by status code
//! - `access_guard_evaluation_seconds` (histogram): policy chain latency
//!
//! # Design Decisions
//! - Uses the `metrics` facade; the Prometheus exporter is optional
//! - Labels are low-cardinality (no paths, no principals)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of an access decision.
pub fn record_decision(decision: &'static str) {
    counter!("access_guard_decisions_total", "decision" => decision).increment(1);
}

/// Record a challenge sent to an unauthenticated client.
pub fn record_challenge(status: u16) {
    counter!("access_guard_challenges_total", "status" => status.to_string()).increment(1);
}

/// Record how long a policy chain took to evaluate.
pub fn record_evaluation(start: Instant) {
    histogram!("access_guard_evaluation_seconds").record(start.elapsed().as_secs_f64());
}
