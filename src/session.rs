//! Session collaborator interface
//!
//! The long-lived session owns subscriptions and in-flight QoS > 0
//! state and drives retransmission; it lives outside this crate. The
//! engine opens a session during the handshake and forwards the
//! publish/subscribe/ack traffic of its connection to it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::Message;
use crate::protocol::{Properties, ProtocolVersion, ReasonCode};
use crate::topic::ParsedFilter;

/// Parameters for opening (or resuming) a session
#[derive(Debug, Clone)]
pub struct OpenParams {
    pub client_id: Arc<str>,
    pub username: Option<String>,
    pub clean_start: bool,
    pub proto_version: ProtocolVersion,
    pub keep_alive: u16,
    /// CONNECT properties (v5.0)
    pub conn_props: Properties,
}

/// Session failures surfaced to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session manager unreachable
    Unavailable,
    /// Another connection owns this session
    Conflict,
    /// Internal session failure
    Internal(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "session manager unavailable"),
            Self::Conflict => write!(f, "session owned by another connection"),
            Self::Internal(msg) => write!(f, "session failure: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

/// Handle to a connection's open session
pub type SessionHandle = Arc<dyn Session>;

/// Opens sessions on behalf of connecting clients
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Returns the session handle and whether prior state was resumed
    async fn open_session(&self, params: OpenParams) -> Result<(SessionHandle, bool), SessionError>;
}

/// The per-client session, driven by its owning connection
#[async_trait]
pub trait Session: Send + Sync {
    /// Hand over an accepted inbound publish. `packet_id` is present
    /// for QoS > 0 so the session can deduplicate QoS 2 deliveries.
    async fn publish(&self, packet_id: Option<u16>, message: Message)
        -> Result<(), SessionError>;

    async fn puback(&self, packet_id: u16, reason: ReasonCode) -> Result<(), SessionError>;

    async fn pubrec(&self, packet_id: u16, reason: ReasonCode) -> Result<(), SessionError>;

    async fn pubrel(&self, packet_id: u16, reason: ReasonCode) -> Result<(), SessionError>;

    async fn pubcomp(&self, packet_id: u16, reason: ReasonCode) -> Result<(), SessionError>;

    /// Register mounted subscription filters with the session
    async fn subscribe(
        &self,
        packet_id: u16,
        properties: Properties,
        filters: Vec<ParsedFilter>,
    ) -> Result<(), SessionError>;

    /// Drop mounted subscription filters from the session
    async fn unsubscribe(&self, packet_id: u16, filters: Vec<String>) -> Result<(), SessionError>;
}
