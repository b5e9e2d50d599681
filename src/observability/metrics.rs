//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_metadata_published_total` (counter): metadata broadcasts by provider
//! - `relay_calls_total` (counter): method calls by outcome
//! - `relay_events_delivered_total` (counter): EVENT_TRIGGER deliveries by provider/event
//! - `relay_acknowledgments_total` (counter): accepted acknowledgments
//! - `relay_messages_dropped_total` (counter): inbound messages dropped by reason
//! - `relay_endpoints_attached` (gauge): currently attached endpoints

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_metadata_published(provider: &str) {
    counter!("relay_metadata_published_total", "provider" => provider.to_string()).increment(1);
}

pub fn record_call(outcome: &'static str) {
    counter!("relay_calls_total", "outcome" => outcome).increment(1);
}

pub fn record_event_delivered(provider: &str, event: &str) {
    counter!(
        "relay_events_delivered_total",
        "provider" => provider.to_string(),
        "event" => event.to_string()
    )
    .increment(1);
}

pub fn record_acknowledgment() {
    counter!("relay_acknowledgments_total").increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!("relay_messages_dropped_total", "reason" => reason).increment(1);
}

pub fn set_attached_endpoints(count: usize) {
    gauge!("relay_endpoints_attached").set(count as f64);
}
