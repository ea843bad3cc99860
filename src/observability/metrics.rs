//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): connections currently open
//! - `proxy_quota_rejections_total` (counter): 413 responses, by domain
//! - `proxy_upstream_failures_total` (counter): failed upstream connects
//! - `proxy_bytes_relayed_total` (counter): relayed bytes, by domain and direction
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::quota::DomainKey;

/// Install the Prometheus recorder and its scrape endpoint.
/// Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_accepted() {
    ::metrics::counter!("proxy_connections_total").increment(1);
}

pub fn set_active_connections(count: u64) {
    ::metrics::gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_quota_rejection(domain: &DomainKey) {
    ::metrics::counter!("proxy_quota_rejections_total", "domain" => domain.to_string()).increment(1);
}

pub fn record_upstream_failure() {
    ::metrics::counter!("proxy_upstream_failures_total").increment(1);
}

pub fn record_bytes_relayed(domain: &DomainKey, direction: &'static str, bytes: usize) {
    ::metrics::counter!(
        "proxy_bytes_relayed_total",
        "domain" => domain.to_string(),
        "direction" => direction
    )
    .increment(bytes as u64);
}
