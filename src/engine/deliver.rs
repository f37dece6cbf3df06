//! Outbound deliver events
//!
//! Events originated by the session, the broker or the engine itself
//! are translated into wire packets here. Pre-v5 connections get
//! compat-translated CONNACK/SUBACK codes from the encoder and never
//! see a DISCONNECT packet.

use std::sync::Arc;

use tracing::trace;

use super::{Error, Protocol};
use crate::broker::Message;
use crate::protocol::{
    ConnAck, Disconnect, Packet, Properties, ProtocolVersion, PubAck, PubComp, PubRec, PubRel,
    ReasonCode, SubAck, UnsubAck,
};

/// Outbound events accepted by [`Protocol::deliver`]
#[derive(Debug, Clone)]
pub enum Deliver {
    /// Message routed to this connection; `packet_id` was assigned by
    /// the session for QoS > 0
    Publish {
        packet_id: Option<u16>,
        message: Message,
    },
    ConnAck {
        reason: ReasonCode,
        session_present: bool,
    },
    PubAck {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubRec {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubRel {
        packet_id: u16,
        reason: ReasonCode,
    },
    PubComp {
        packet_id: u16,
        reason: ReasonCode,
    },
    SubAck {
        packet_id: u16,
        reason_codes: Vec<ReasonCode>,
    },
    UnsubAck {
        packet_id: u16,
        reason_codes: Vec<ReasonCode>,
    },
    Disconnect {
        reason: ReasonCode,
    },
}

impl Protocol {
    /// Translate one outbound event into a wire packet and send it
    pub async fn deliver(&mut self, event: Deliver) -> Result<(), Error> {
        match event {
            Deliver::Publish { packet_id, message } => {
                self.deliver_publish(packet_id, message).await
            }
            Deliver::ConnAck {
                reason,
                session_present,
            } => self.send_packet(&Packet::ConnAck(ConnAck {
                session_present,
                reason_code: reason,
                properties: Properties::default(),
            })),
            Deliver::PubAck { packet_id, reason } => {
                self.send_packet(&Packet::PubAck(PubAck::with_reason(packet_id, reason)))
            }
            Deliver::PubRec { packet_id, reason } => {
                self.send_packet(&Packet::PubRec(PubRec::with_reason(packet_id, reason)))
            }
            Deliver::PubRel { packet_id, reason } => {
                self.send_packet(&Packet::PubRel(PubRel::with_reason(packet_id, reason)))
            }
            Deliver::PubComp { packet_id, reason } => {
                self.send_packet(&Packet::PubComp(PubComp::with_reason(packet_id, reason)))
            }
            Deliver::SubAck {
                packet_id,
                reason_codes,
            } => self.send_packet(&Packet::SubAck(SubAck {
                packet_id,
                reason_codes,
                properties: Properties::default(),
            })),
            Deliver::UnsubAck {
                packet_id,
                reason_codes,
            } => self.send_packet(&Packet::UnsubAck(UnsubAck {
                packet_id,
                reason_codes,
                properties: Properties::default(),
            })),
            Deliver::Disconnect { reason } => {
                if self.proto_version != ProtocolVersion::V5 {
                    trace!(client_id = %self.client_id, "disconnect suppressed pre-v5");
                    return Ok(());
                }
                self.send_packet(&Packet::Disconnect(Disconnect {
                    reason_code: reason,
                    properties: Properties::default(),
                }))
            }
        }
    }

    async fn deliver_publish(
        &mut self,
        packet_id: Option<u16>,
        message: Message,
    ) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let hooks = Arc::clone(&self.hooks);
        hooks.on_message_delivered(&self.client(), &message).await;

        // Bridges see the retain flag as published; everyone else only
        // when the message came from the retained store
        let retain = message.retain && (self.is_bridge || message.headers.retained);

        let topic: Arc<str> = match &self.mountpoint {
            Some(mountpoint) => Arc::from(mountpoint.strip(&message.topic)),
            None => Arc::clone(&message.topic),
        };

        let publish = message.into_publish(topic, packet_id, retain);
        self.send_packet(&Packet::Publish(publish))
    }
}
