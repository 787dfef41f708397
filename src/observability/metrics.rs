//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): HTTP requests by method, status, kind
//! - `proxy_request_duration_seconds` (histogram): HTTP latency
//! - `proxy_websocket_sessions` (gauge): open bridged sessions
//! - `proxy_websocket_connect_failures_total` (counter): by reason
//! - `proxy_websocket_frames_total` (counter): by direction and frame type
//! - `proxy_websocket_bytes_total` (counter): payload bytes by direction
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; without an installed
//!   recorder they are no-ops
//! - Prometheus exporter only starts when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("kind", kind),
    ];
    counter!("proxy_requests_total", labels.clone()).increment(1);
    histogram!("proxy_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    gauge!("proxy_websocket_sessions").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_websocket_sessions").decrement(1.0);
}

pub fn record_connect_failure(reason: &'static str) {
    counter!("proxy_websocket_connect_failures_total", "reason" => reason).increment(1);
}

/// Record one relayed frame.
pub fn record_frame(direction: &'static str, kind: &'static str, bytes: usize) {
    counter!("proxy_websocket_frames_total", "direction" => direction, "kind" => kind)
        .increment(1);
    counter!("proxy_websocket_bytes_total", "direction" => direction).increment(bytes as u64);
}
