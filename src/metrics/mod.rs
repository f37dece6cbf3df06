//! Prometheus metrics for the protocol engine
//!
//! Counters the engine bumps as packets and messages cross the
//! connection boundary. The HTTP exposition side belongs to the host
//! process; this module only owns the registry and counters.

use prometheus::{IntCounter, Opts, Registry};

/// Engine metrics, one instance shared across connections
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Packet counters (every MQTT control packet)
    pub packets_received: IntCounter,
    pub packets_sent: IntCounter,

    // Message counters (PUBLISH frames only)
    pub messages_received: IntCounter,
    pub messages_sent: IntCounter,

    // Lifecycle counters
    pub connections_total: IntCounter,
    pub auth_failures_total: IntCounter,
    pub acl_denials_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let packets_received = IntCounter::with_opts(Opts::new(
            "gatemq_packets_received_total",
            "Total MQTT control packets received from clients",
        ))
        .unwrap();

        let packets_sent = IntCounter::with_opts(Opts::new(
            "gatemq_packets_sent_total",
            "Total MQTT control packets sent to clients",
        ))
        .unwrap();

        let messages_received = IntCounter::with_opts(Opts::new(
            "gatemq_messages_received_total",
            "Total PUBLISH packets received from clients",
        ))
        .unwrap();

        let messages_sent = IntCounter::with_opts(Opts::new(
            "gatemq_messages_sent_total",
            "Total PUBLISH packets sent to clients",
        ))
        .unwrap();

        let connections_total = IntCounter::with_opts(Opts::new(
            "gatemq_connections_total",
            "Total accepted client connections since startup",
        ))
        .unwrap();

        let auth_failures_total = IntCounter::with_opts(Opts::new(
            "gatemq_auth_failures_total",
            "Total failed authentication attempts",
        ))
        .unwrap();

        let acl_denials_total = IntCounter::with_opts(Opts::new(
            "gatemq_acl_denials_total",
            "Total publish/subscribe operations denied by ACL",
        ))
        .unwrap();

        for collector in [
            &packets_received,
            &packets_sent,
            &messages_received,
            &messages_sent,
            &connections_total,
            &auth_failures_total,
            &acl_denials_total,
        ] {
            registry.register(Box::new(collector.clone())).unwrap();
        }

        Self {
            registry,
            packets_received,
            packets_sent,
            messages_received,
            messages_sent,
            connections_total,
            auth_failures_total,
            acl_denials_total,
        }
    }

    /// Record a validated inbound packet
    pub fn packet_received(&self, is_publish: bool) {
        self.packets_received.inc();
        if is_publish {
            self.messages_received.inc();
        }
    }

    /// Record a successfully sent outbound packet
    pub fn packet_sent(&self, is_publish: bool) {
        self.packets_sent.inc();
        if is_publish {
            self.messages_sent.inc();
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_counters_track_publish_only() {
        let metrics = Metrics::new();
        metrics.packet_received(false);
        metrics.packet_received(true);
        metrics.packet_sent(true);

        assert_eq!(metrics.packets_received.get(), 2);
        assert_eq!(metrics.messages_received.get(), 1);
        assert_eq!(metrics.packets_sent.get(), 1);
        assert_eq!(metrics.messages_sent.get(), 1);
    }

    #[test]
    fn all_counters_registered() {
        let metrics = Metrics::new();
        assert_eq!(metrics.registry.gather().len(), 7);
    }
}
