//! Metrics Module
//!
//! Pool-level counters with Prometheus export and a JSON snapshot for the
//! control API's `/stats` endpoint.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use serde::Serialize;
use tracing::error;

/// Collects and exports pool metrics.
pub struct Metrics {
    registry: Registry,
    connections_opened: IntCounter,
    connections_closed: IntCounter,
    active_connections: Gauge,
    channels_joined: IntCounter,
    channels_parted: IntCounter,
    messages_sent: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_opened = IntCounter::new(
            "botherd_connections_opened_total",
            "Connections that completed the IRC handshake",
        )
        .expect("Failed to create connections_opened counter");

        let connections_closed = IntCounter::new(
            "botherd_connections_closed_total",
            "Connections that disconnected, planned or not",
        )
        .expect("Failed to create connections_closed counter");

        let active_connections = Gauge::new(
            "botherd_active_connections",
            "Currently identified connections across all servers",
        )
        .expect("Failed to create active_connections gauge");

        let channels_joined = IntCounter::new(
            "botherd_channels_joined_total",
            "Confirmed channel joins",
        )
        .expect("Failed to create channels_joined counter");

        let channels_parted = IntCounter::new(
            "botherd_channels_parted_total",
            "Confirmed channel parts, including kicks",
        )
        .expect("Failed to create channels_parted counter");

        let messages_sent = IntCounter::new(
            "botherd_messages_sent_total",
            "Messages routed to channels",
        )
        .expect("Failed to create messages_sent counter");

        registry
            .register(Box::new(connections_opened.clone()))
            .expect("Failed to register connections_opened");
        registry
            .register(Box::new(connections_closed.clone()))
            .expect("Failed to register connections_closed");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("Failed to register active_connections");
        registry
            .register(Box::new(channels_joined.clone()))
            .expect("Failed to register channels_joined");
        registry
            .register(Box::new(channels_parted.clone()))
            .expect("Failed to register channels_parted");
        registry
            .register(Box::new(messages_sent.clone()))
            .expect("Failed to register messages_sent");

        Self {
            registry,
            connections_opened,
            connections_closed,
            active_connections,
            channels_joined,
            channels_parted,
            messages_sent,
        }
    }

    pub fn connection_opened(&self) {
        self.connections_opened.inc();
        self.active_connections.inc();
    }

    pub fn connection_closed(&self) {
        self.connections_closed.inc();
        self.active_connections.dec();
    }

    pub fn channel_joined(&self) {
        self.channels_joined.inc();
    }

    pub fn channel_parted(&self) {
        self.channels_parted.inc();
    }

    pub fn message_sent(&self) {
        self.messages_sent.inc();
    }

    /// Point-in-time counter values for the JSON stats surface.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.get(),
            connections_closed: self.connections_closed.get(),
            active_connections: self.active_connections.get() as i64,
            channels_joined: self.channels_joined.get(),
            channels_parted: self.channels_parted.get(),
            messages_sent: self.messages_sent.get(),
        }
    }

    /// Export all metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode Prometheus metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: i64,
    pub channels_joined: u64,
    pub channels_parted: u64,
    pub messages_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_lifecycle() {
        let metrics = Metrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.channel_joined();
        metrics.message_sent();
        metrics.connection_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_opened, 2);
        assert_eq!(snapshot.connections_closed, 1);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.channels_joined, 1);
        assert_eq!(snapshot.messages_sent, 1);
    }

    #[test]
    fn test_prometheus_export_contains_counters() {
        let metrics = Metrics::new();
        metrics.connection_opened();

        let exported = metrics.export_prometheus();
        assert!(exported.contains("botherd_connections_opened_total"));
        assert!(exported.contains("botherd_active_connections"));
    }
}
