//! Terminal cleanup
//!
//! Invoked exactly once by the owning task when the connection ends.
//! Conflict shutdowns (session takeover) only unregister; every other
//! reason runs the full path, publishing the will unless the
//! connection died on an authentication failure.

use std::fmt;

use tracing::{debug, warn};

use super::Protocol;
use crate::protocol::ReasonCode;

/// Why the connection is going away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Graceful client disconnect
    Normal,
    /// Another connection took over this client id
    Conflict,
    /// Authentication never succeeded; suppresses the will
    AuthFailure,
    /// Keepalive timer expired without traffic
    KeepaliveTimeout,
    /// Protocol failure with its reason code
    Protocol(ReasonCode),
    /// Transport closed underneath the connection
    TransportClosed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Conflict => write!(f, "conflict"),
            Self::AuthFailure => write!(f, "authentication failure"),
            Self::KeepaliveTimeout => write!(f, "keepalive timeout"),
            Self::Protocol(code) => write!(f, "protocol error: {}", code),
            Self::TransportClosed => write!(f, "transport closed"),
        }
    }
}

impl Protocol {
    /// Tear the connection down. A no-op before any client identity is
    /// known.
    pub async fn shutdown(&mut self, reason: DisconnectReason) {
        if self.client_id.is_empty() {
            return;
        }

        debug!(client_id = %self.client_id, %reason, "shutdown");

        if reason == DisconnectReason::Conflict {
            self.connections.unregister(&self.client_id).await;
            self.connected = false;
            self.session = None;
            return;
        }

        if reason != DisconnectReason::AuthFailure {
            if let Some(will) = self.will_message.take() {
                debug!(
                    client_id = %self.client_id,
                    topic = %will.topic,
                    "publishing will message"
                );
                if let Err(e) = self.broker.publish(will).await {
                    warn!(client_id = %self.client_id, error = %e, "will publish failed");
                }
            }
        } else {
            self.will_message = None;
        }

        let client = self.client();
        self.hooks.on_client_disconnected(&client, &reason).await;
        self.connections.unregister(&self.client_id).await;

        self.connected = false;
        self.session = None;
    }
}
