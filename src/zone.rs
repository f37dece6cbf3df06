//! Zone policy
//!
//! A zone is a named policy bucket supplying per-client limits: QoS and
//! retain capabilities, packet size, client-id length, ACL toggle,
//! mountpoint template and keepalive behavior. Every connection is
//! pinned to one zone at init.

use serde::Deserialize;

use crate::protocol::{QoS, ReasonCode};
use crate::topic::ParsedFilter;

/// How to derive the username from the peer certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerCertAsUsername {
    /// Use the certificate common name
    Cn,
    /// Use the full subject distinguished name
    Dn,
    /// Leave the username to the CONNECT packet
    #[default]
    None,
}

/// Per-zone connection policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Zone {
    /// Maximum inbound packet size in bytes (framer limit)
    pub max_packet_size: u32,
    /// Maximum accepted client identifier length
    pub max_clientid_len: usize,
    /// Mountpoint template; may contain %c and %u placeholders
    pub mountpoint: Option<String>,
    /// Whether per-topic ACL checks apply in this zone
    pub enable_acl: bool,
    /// Fraction of the negotiated keepalive after which the timer fires
    pub keepalive_backoff: f32,
    /// Username derivation from the peer certificate
    pub peer_cert_as_username: PeerCertAsUsername,
    /// Highest QoS the zone grants
    pub max_qos: QoS,
    /// Whether retained messages are accepted
    pub retain_available: bool,
    /// Whether wildcard subscription filters are accepted
    pub wildcard_subscription_available: bool,
    /// Whether $share subscriptions are accepted
    pub shared_subscription_available: bool,
    /// Maximum topic levels, 0 = unlimited
    pub max_topic_levels: usize,
    /// Keepalive pinned by the server (v5 ServerKeepAlive), overrides
    /// whatever the client proposes
    pub server_keepalive: Option<u16>,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
            max_clientid_len: default_max_clientid_len(),
            mountpoint: None,
            enable_acl: false,
            keepalive_backoff: default_keepalive_backoff(),
            peer_cert_as_username: PeerCertAsUsername::None,
            max_qos: QoS::ExactlyOnce,
            retain_available: true,
            wildcard_subscription_available: true,
            shared_subscription_available: true,
            max_topic_levels: 0,
            server_keepalive: None,
        }
    }
}

fn default_max_packet_size() -> u32 {
    1024 * 1024
}

fn default_max_clientid_len() -> usize {
    65535
}

fn default_keepalive_backoff() -> f32 {
    0.75
}

/// Capability view advertised to clients and exposed through the
/// engine's `caps()` accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub max_qos: QoS,
    pub retain_available: bool,
    pub wildcard_subscription_available: bool,
    pub shared_subscription_available: bool,
    pub max_packet_size: u32,
    pub server_keepalive: Option<u16>,
}

impl Zone {
    /// Capability check for an inbound PUBLISH
    pub fn check_pub(&self, qos: QoS, retain: bool) -> Result<(), ReasonCode> {
        if qos > self.max_qos {
            return Err(ReasonCode::QoSNotSupported);
        }
        if retain && !self.retain_available {
            return Err(ReasonCode::RetainNotSupported);
        }
        Ok(())
    }

    /// Capability check for one subscription filter. Success yields the
    /// granted-QoS reason code after clamping to the zone maximum.
    pub fn check_sub(&self, parsed: &ParsedFilter) -> ReasonCode {
        if parsed.share_group.is_some() && !self.shared_subscription_available {
            return ReasonCode::SharedSubsNotSupported;
        }
        if !self.wildcard_subscription_available && crate::topic::has_wildcards(&parsed.filter) {
            return ReasonCode::WildcardSubsNotSupported;
        }
        if self.max_topic_levels > 0
            && parsed.filter.split('/').count() > self.max_topic_levels
        {
            return ReasonCode::TopicFilterInvalid;
        }

        match parsed.options.qos.min(self.max_qos) {
            QoS::AtMostOnce => ReasonCode::Success,
            QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
            QoS::ExactlyOnce => ReasonCode::GrantedQoS2,
        }
    }

    pub fn caps(&self) -> Caps {
        Caps {
            max_qos: self.max_qos,
            retain_available: self.retain_available,
            wildcard_subscription_available: self.wildcard_subscription_available,
            shared_subscription_available: self.shared_subscription_available,
            max_packet_size: self.max_packet_size,
            server_keepalive: self.server_keepalive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SubscriptionOptions;

    fn parsed(filter: &str, qos: QoS) -> ParsedFilter {
        crate::topic::parse(
            filter,
            SubscriptionOptions {
                qos,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn pub_caps_enforced() {
        let zone = Zone {
            max_qos: QoS::AtLeastOnce,
            retain_available: false,
            ..Default::default()
        };
        assert!(zone.check_pub(QoS::AtLeastOnce, false).is_ok());
        assert_eq!(
            zone.check_pub(QoS::ExactlyOnce, false),
            Err(ReasonCode::QoSNotSupported)
        );
        assert_eq!(
            zone.check_pub(QoS::AtMostOnce, true),
            Err(ReasonCode::RetainNotSupported)
        );
    }

    #[test]
    fn sub_grant_clamps_qos() {
        let zone = Zone {
            max_qos: QoS::AtLeastOnce,
            ..Default::default()
        };
        assert_eq!(
            zone.check_sub(&parsed("a/b", QoS::ExactlyOnce)),
            ReasonCode::GrantedQoS1
        );
        assert_eq!(
            zone.check_sub(&parsed("a/b", QoS::AtMostOnce)),
            ReasonCode::Success
        );
    }

    #[test]
    fn sub_rejects_unavailable_features() {
        let zone = Zone {
            wildcard_subscription_available: false,
            shared_subscription_available: false,
            ..Default::default()
        };
        assert_eq!(
            zone.check_sub(&parsed("a/#", QoS::AtMostOnce)),
            ReasonCode::WildcardSubsNotSupported
        );
        assert_eq!(
            zone.check_sub(&parsed("$share/g/a", QoS::AtMostOnce)),
            ReasonCode::SharedSubsNotSupported
        );
    }

    #[test]
    fn defaults_match_policy() {
        let zone = Zone::default();
        assert_eq!(zone.keepalive_backoff, 0.75);
        assert_eq!(zone.max_qos, QoS::ExactlyOnce);
        assert!(!zone.enable_acl);
    }
}
