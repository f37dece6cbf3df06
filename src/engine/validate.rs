//! Inbound packet validation
//!
//! Version-independent structural checks applied before dispatch. A
//! failure that maps to a v5 reason code disconnects with that code;
//! anything else disconnects as a malformed packet. Per-filter
//! SUBSCRIBE problems (wildcard placement, policy) are not fatal here -
//! they surface as per-filter SUBACK codes in the pipeline.

use crate::protocol::{Packet, QoS, ReasonCode};
use crate::topic;

/// A rejected inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invalid {
    /// v5 reason code when the failure defines one
    pub reason: Option<ReasonCode>,
    pub cause: &'static str,
}

impl Invalid {
    fn reason(reason: ReasonCode, cause: &'static str) -> Self {
        Self {
            reason: Some(reason),
            cause,
        }
    }

    fn malformed(cause: &'static str) -> Self {
        Self {
            reason: None,
            cause,
        }
    }
}

pub(crate) fn validate(packet: &Packet) -> Result<(), Invalid> {
    match packet {
        Packet::Connect(connect) => {
            if let Some(will) = &connect.will {
                if topic::validate_name(&will.topic, 0).is_err() {
                    return Err(Invalid::reason(
                        ReasonCode::TopicNameInvalid,
                        "invalid will topic",
                    ));
                }
            }
            Ok(())
        }
        Packet::Publish(publish) => {
            if topic::validate_name(&publish.topic, 0).is_err() {
                return Err(Invalid::reason(
                    ReasonCode::TopicNameInvalid,
                    "invalid topic name",
                ));
            }
            match publish.qos {
                QoS::AtMostOnce => {
                    if publish.dup {
                        return Err(Invalid::malformed("dup flag set on QoS 0 publish"));
                    }
                    if publish.packet_id.is_some() {
                        return Err(Invalid::malformed("packet identifier on QoS 0 publish"));
                    }
                }
                QoS::AtLeastOnce | QoS::ExactlyOnce => match publish.packet_id {
                    None | Some(0) => {
                        return Err(Invalid::malformed(
                            "packet identifier required for QoS > 0",
                        ));
                    }
                    Some(_) => {}
                },
            }
            Ok(())
        }
        Packet::Subscribe(subscribe) => {
            if subscribe.packet_id == 0 {
                return Err(Invalid::malformed("zero packet identifier"));
            }
            if subscribe.filters.is_empty() {
                return Err(Invalid::reason(
                    ReasonCode::ProtocolError,
                    "subscribe without filters",
                ));
            }
            if subscribe.filters.iter().any(|s| s.filter.is_empty()) {
                return Err(Invalid::reason(
                    ReasonCode::TopicFilterInvalid,
                    "empty topic filter",
                ));
            }
            Ok(())
        }
        Packet::Unsubscribe(unsubscribe) => {
            if unsubscribe.packet_id == 0 {
                return Err(Invalid::malformed("zero packet identifier"));
            }
            if unsubscribe.filters.is_empty() {
                return Err(Invalid::reason(
                    ReasonCode::ProtocolError,
                    "unsubscribe without filters",
                ));
            }
            if unsubscribe.filters.iter().any(|f| f.is_empty()) {
                return Err(Invalid::reason(
                    ReasonCode::TopicFilterInvalid,
                    "empty topic filter",
                ));
            }
            Ok(())
        }
        Packet::PubAck(p) => nonzero_packet_id(p.packet_id),
        Packet::PubRec(p) => nonzero_packet_id(p.packet_id),
        Packet::PubRel(p) => nonzero_packet_id(p.packet_id),
        Packet::PubComp(p) => nonzero_packet_id(p.packet_id),
        _ => Ok(()),
    }
}

fn nonzero_packet_id(packet_id: u16) -> Result<(), Invalid> {
    if packet_id == 0 {
        Err(Invalid::malformed("zero packet identifier"))
    } else {
        Ok(())
    }
}
