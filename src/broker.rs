//! Broker routing fabric interface and the internal message form
//!
//! The engine converts accepted PUBLISH packets into `Message` values
//! before handing them to the session, and back into PUBLISH packets on
//! delivery. The routing fabric itself lives outside this crate; the
//! engine only reaches it directly to publish will messages.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::protocol::{Properties, Publish, QoS};

/// Flags the broker attaches to a message outside its wire form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeaders {
    /// Set when the message is served from the retained store; a plain
    /// routed message keeps this false even if the publisher set the
    /// retain flag.
    pub retained: bool,
}

/// A routable message decoupled from any protocol version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client identifier of the publisher
    pub publisher: Arc<str>,
    pub topic: Arc<str>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub headers: MessageHeaders,
    pub properties: Properties,
    pub timestamp: SystemTime,
}

impl Message {
    /// Build a message from an accepted inbound PUBLISH. The topic is
    /// passed separately because the mountpoint has already been applied.
    pub fn from_publish(
        publisher: Arc<str>,
        topic: Arc<str>,
        publish: &Publish,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            publisher,
            topic,
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
            dup: publish.dup,
            headers: MessageHeaders::default(),
            properties: publish.properties.clone(),
            timestamp,
        }
    }

    /// Convert into an outbound PUBLISH packet with the given topic
    /// (mountpoint already stripped) and packet identifier.
    pub fn into_publish(self, topic: Arc<str>, packet_id: Option<u16>, retain: bool) -> Publish {
        Publish {
            dup: self.dup,
            qos: self.qos,
            retain,
            topic,
            packet_id,
            payload: self.payload,
            properties: self.properties,
        }
    }
}

/// Broker errors surfaced to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Routing fabric unavailable
    Unavailable,
    /// Message refused by the fabric
    Refused(&'static str),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "broker unavailable"),
            Self::Refused(msg) => write!(f, "message refused: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

/// The routing fabric, as seen from a single connection
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a message directly into the fabric, bypassing any
    /// session bookkeeping. Used for will messages.
    async fn publish(&self, message: Message) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_roundtrip_keeps_payload_and_qos() {
        let publish = Publish {
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: "ignored".into(),
            packet_id: Some(3),
            payload: Bytes::from_static(b"data"),
            ..Default::default()
        };
        let msg = Message::from_publish(
            "c1".into(),
            "mp/t".into(),
            &publish,
            SystemTime::UNIX_EPOCH,
        );
        assert_eq!(&*msg.topic, "mp/t");
        assert!(!msg.headers.retained);

        let out = msg.into_publish("t".into(), Some(9), false);
        assert_eq!(out.packet_id, Some(9));
        assert_eq!(out.qos, QoS::AtLeastOnce);
        assert!(!out.retain);
        assert_eq!(out.payload, Bytes::from_static(b"data"));
    }
}
