//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ws_hub_connections_accepted_total` (counter): raw connections accepted
//! - `ws_hub_active_connections` (gauge): connections still being handled
//! - `ws_hub_layer_failures_total` (counter): failed PROXY/TLS layers, by layer
//! - `ws_hub_requests_total` (counter): HTTP requests, by outcome
//!
//! Recording is a no-op until a recorder is installed, so the library can
//! be embedded without the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// How the dispatcher disposed of one HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Upgraded,
    NotFound,
    Forbidden,
    HeaderTooLarge,
    /// Answered with 101 but the WebSocket never came up.
    UpgradeFailed,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Upgraded => "upgraded",
            RequestOutcome::NotFound => "not_found",
            RequestOutcome::Forbidden => "forbidden",
            RequestOutcome::HeaderTooLarge => "header_too_large",
            RequestOutcome::UpgradeFailed => "upgrade_failed",
        }
    }
}

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn connection_opened() {
    counter!("ws_hub_connections_accepted_total").increment(1);
    gauge!("ws_hub_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("ws_hub_active_connections").decrement(1.0);
}

pub fn layer_failed(layer: &'static str) {
    counter!("ws_hub_layer_failures_total", "layer" => layer).increment(1);
}

pub fn record_request(outcome: RequestOutcome) {
    counter!("ws_hub_requests_total", "outcome" => outcome.as_str()).increment(1);
}
