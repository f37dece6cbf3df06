//! Per-connection MQTT protocol engine
//!
//! One `Protocol` value owns the state of a single client connection
//! and is driven by exactly three entry points:
//!
//! - [`Protocol::received`] - a decoded inbound packet from the framer
//! - [`Protocol::deliver`] - an outbound event from session/broker/self
//! - [`Protocol::shutdown`] - terminal cleanup
//!
//! The owning connection task serializes all three; the engine holds no
//! locks. Side effects go through the injected collaborators and the
//! send function, which receives fully serialized packets.

mod connect;
mod deliver;
mod publish;
mod qos;
mod shutdown;
mod subscribe;
mod validate;


pub use deliver::Deliver;
pub use shutdown::DisconnectReason;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::auth::{AccessControl, Credentials};
use crate::broker::{Broker, Message};
use crate::codec::Encoder;
use crate::hooks::Hooks;
use crate::metrics::Metrics;
use crate::protocol::{
    Disconnect, EncodeError, Packet, Properties, ProtocolVersion, ReasonCode,
};
use crate::registry::{ConnectionHandle, ConnectionInfo, ConnectionManager};
use crate::session::{SessionError, SessionHandle, SessionManager};
use crate::topic::Mountpoint;
use crate::zone::{Caps, PeerCertAsUsername, Zone};

/// Byte sink handed serialized outbound packets
pub type SendFn = Box<dyn FnMut(Bytes) -> Result<(), SendError> + Send>;

/// Clock source, injected so the engine never reaches for ambient time
pub type NowFn = fn() -> SystemTime;

/// Failures reported by the send function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transport gone
    Closed,
    /// Transport refused the write
    Rejected(&'static str),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Rejected(msg) => write!(f, "send rejected: {}", msg),
        }
    }
}

impl std::error::Error for SendError {}

/// Engine errors, one variant per §disposition the protocol defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Non-CONNECT packet before a successful handshake
    NotConnected,
    /// Second CONNECT on a live connection
    BadConnect,
    /// Structurally broken packet
    Malformed(&'static str),
    /// Semantic protocol failure with its reason code
    Protocol(ReasonCode),
    /// Authentication or authorization refused the operation
    NotAuthorized,
    /// Client identifier rejected by policy
    ClientIdNotValid,
    /// Session collaborator failure
    Session(SessionError),
    /// Outbound packet could not be encoded
    Encode(EncodeError),
    /// Send function failure
    Send(SendError),
    /// Clean terminal stop (client DISCONNECT)
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "packet received before CONNECT"),
            Self::BadConnect => write!(f, "duplicate CONNECT"),
            Self::Malformed(cause) => write!(f, "malformed packet: {}", cause),
            Self::Protocol(code) => write!(f, "protocol error: {}", code),
            Self::NotAuthorized => write!(f, "not authorized"),
            Self::ClientIdNotValid => write!(f, "client identifier not valid"),
            Self::Session(e) => write!(f, "session error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
            Self::Send(e) => write!(f, "send error: {}", e),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Error::Send(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

/// Arms the connection's keepalive timer. Expiry handling stays with
/// the owning task; the engine only schedules.
pub trait KeepaliveTimer: Send + Sync {
    fn arm(&self, after: Duration);
}

/// Timer that never fires, for hosts driving keepalive themselves
pub struct NoopKeepalive;

impl KeepaliveTimer for NoopKeepalive {
    fn arm(&self, _after: Duration) {}
}

/// Packet and message counters, kept separately for each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// All control packets
    pub pkt: u64,
    /// PUBLISH packets only
    pub msg: u64,
}

impl Stats {
    fn record(&mut self, is_publish: bool) {
        self.pkt += 1;
        if is_publish {
            self.msg += 1;
        }
    }
}

/// Both traffic directions of [`Stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficStats {
    pub recv: Stats,
    pub send: Stats,
}

/// Identity view handed to hooks
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub client_id: Arc<str>,
    pub username: Option<String>,
    pub peer_address: SocketAddr,
    pub proto_version: ProtocolVersion,
    pub is_bridge: bool,
}

/// Peer TLS certificate fields the engine may derive a username from
#[derive(Debug, Clone, Default)]
pub struct PeerCertificate {
    pub common_name: Option<String>,
    pub subject: Option<String>,
}

/// Initial framer state for this connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerSeed {
    pub max_packet_size: u32,
    pub proto_version: ProtocolVersion,
}

/// Everything a connection needs at creation time
pub struct Init {
    pub zone: Arc<Zone>,
    pub send_fn: SendFn,
    pub peer_address: SocketAddr,
    pub peer_certificate: Option<PeerCertificate>,
    pub access_control: Arc<dyn AccessControl>,
    pub sessions: Arc<dyn SessionManager>,
    pub broker: Arc<dyn Broker>,
    pub connections: Arc<dyn ConnectionManager>,
    pub hooks: Arc<dyn Hooks>,
    pub metrics: Option<Arc<Metrics>>,
    pub keepalive_timer: Arc<dyn KeepaliveTimer>,
    /// Handle the registry maps this client id to
    pub self_handle: ConnectionHandle,
    pub now_fn: NowFn,
}

/// Per-connection protocol state machine
pub struct Protocol {
    zone: Arc<Zone>,
    send_fn: SendFn,
    peer_address: SocketAddr,
    #[allow(dead_code)]
    peer_certificate: Option<PeerCertificate>,
    proto_version: ProtocolVersion,
    proto_name: String,
    client_id: Arc<str>,
    username: Option<String>,
    is_super: bool,
    is_bridge: bool,
    clean_start: bool,
    keepalive: u16,
    max_packet_size: u32,
    mountpoint: Option<Mountpoint>,
    enable_acl: bool,
    will_message: Option<Message>,
    session: Option<SessionHandle>,
    conn_props: Properties,
    ack_props: Properties,
    recv_stats: Stats,
    send_stats: Stats,
    connected: bool,
    connected_at: Option<SystemTime>,
    encoder: Encoder,

    access_control: Arc<dyn AccessControl>,
    sessions: Arc<dyn SessionManager>,
    broker: Arc<dyn Broker>,
    connections: Arc<dyn ConnectionManager>,
    hooks: Arc<dyn Hooks>,
    metrics: Option<Arc<Metrics>>,
    keepalive_timer: Arc<dyn KeepaliveTimer>,
    self_handle: ConnectionHandle,
    now_fn: NowFn,
}

impl Protocol {
    /// Create the state for a fresh connection. Nothing is sent until
    /// the first packet arrives.
    pub fn init(init: Init) -> Self {
        let username = match (&init.peer_certificate, init.zone.peer_cert_as_username) {
            (Some(cert), PeerCertAsUsername::Cn) => cert.common_name.clone(),
            (Some(cert), PeerCertAsUsername::Dn) => cert.subject.clone(),
            _ => None,
        };

        Self {
            max_packet_size: init.zone.max_packet_size,
            enable_acl: init.zone.enable_acl,
            zone: init.zone,
            send_fn: init.send_fn,
            peer_address: init.peer_address,
            peer_certificate: init.peer_certificate,
            proto_version: ProtocolVersion::V311,
            proto_name: ProtocolVersion::V311.protocol_name().to_string(),
            client_id: Arc::from(""),
            username,
            is_super: false,
            is_bridge: false,
            clean_start: true,
            keepalive: 0,
            mountpoint: None,
            will_message: None,
            session: None,
            conn_props: Properties::default(),
            ack_props: Properties::default(),
            recv_stats: Stats::default(),
            send_stats: Stats::default(),
            connected: false,
            connected_at: None,
            encoder: Encoder::new(ProtocolVersion::V311),
            access_control: init.access_control,
            sessions: init.sessions,
            broker: init.broker,
            connections: init.connections,
            hooks: init.hooks,
            metrics: init.metrics,
            keepalive_timer: init.keepalive_timer,
            self_handle: init.self_handle,
            now_fn: init.now_fn,
        }
    }

    /// Process one inbound packet in arrival order
    pub async fn received(&mut self, packet: Packet) -> Result<(), Error> {
        if let Err(invalid) = validate::validate(&packet) {
            return self.invalid_packet(invalid);
        }

        let is_publish = matches!(packet, Packet::Publish(_));
        self.recv_stats.record(is_publish);
        if let Some(metrics) = &self.metrics {
            metrics.packet_received(is_publish);
        }

        match packet {
            Packet::Connect(connect) => {
                if self.connected {
                    return Err(Error::BadConnect);
                }
                self.handle_connect(*connect).await
            }
            _ if !self.connected => Err(Error::NotConnected),
            Packet::Publish(publish) => self.handle_publish(publish).await,
            Packet::PubAck(puback) => self.handle_puback(puback).await,
            Packet::PubRec(pubrec) => self.handle_pubrec(pubrec).await,
            Packet::PubRel(pubrel) => self.handle_pubrel(pubrel).await,
            Packet::PubComp(pubcomp) => self.handle_pubcomp(pubcomp).await,
            Packet::Subscribe(subscribe) => self.handle_subscribe(subscribe).await,
            Packet::Unsubscribe(unsubscribe) => self.handle_unsubscribe(unsubscribe).await,
            Packet::PingReq => self.handle_pingreq(),
            Packet::Disconnect(disconnect) => self.handle_client_disconnect(disconnect),
            Packet::ConnAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) | Packet::PingResp => {
                warn!(
                    client_id = %self.client_id,
                    packet_type = packet.packet_type(),
                    "server-to-client packet received from client"
                );
                self.send_disconnect(ReasonCode::ProtocolError)?;
                Err(Error::Protocol(ReasonCode::ProtocolError))
            }
        }
    }

    fn invalid_packet(&mut self, invalid: validate::Invalid) -> Result<(), Error> {
        trace!(cause = invalid.cause, "invalid inbound packet");
        match invalid.reason {
            Some(code) => {
                self.send_disconnect(code)?;
                Err(Error::Protocol(code))
            }
            None => {
                self.send_disconnect(ReasonCode::MalformedPacket)?;
                Err(Error::Malformed(invalid.cause))
            }
        }
    }

    /// Emit a DISCONNECT towards the client; suppressed entirely before v5
    pub(crate) fn send_disconnect(&mut self, reason_code: ReasonCode) -> Result<(), Error> {
        if self.proto_version != ProtocolVersion::V5 {
            return Ok(());
        }
        self.send_packet(&Packet::Disconnect(Disconnect {
            reason_code,
            properties: Properties::default(),
        }))
    }

    /// Serialize and push one packet through the send function,
    /// updating the outbound counters on success.
    pub(crate) fn send_packet(&mut self, packet: &Packet) -> Result<(), Error> {
        let mut buf = BytesMut::with_capacity(64);
        self.encoder.encode(packet, &mut buf)?;
        (self.send_fn)(buf.freeze())?;

        let is_publish = matches!(packet, Packet::Publish(_));
        self.send_stats.record(is_publish);
        if let Some(metrics) = &self.metrics {
            metrics.packet_sent(is_publish);
        }
        Ok(())
    }

    /// Apply the mountpoint prefix to a topic, once resolved
    pub(crate) fn mount_topic(&self, topic: &str) -> String {
        match &self.mountpoint {
            Some(mountpoint) => mountpoint.prepend(topic),
            None => topic.to_string(),
        }
    }

    // Derived read-only views

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            peer_address: self.peer_address,
            proto_version: self.proto_version,
            username: self.username.clone(),
            clean_start: self.clean_start,
            keepalive: self.keepalive,
            is_bridge: self.is_bridge,
            connected_at: self.connected_at,
        }
    }

    pub fn caps(&self) -> Caps {
        self.zone.caps()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            peer_address: self.peer_address,
        }
    }

    pub fn client(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            peer_address: self.peer_address,
            proto_version: self.proto_version,
            is_bridge: self.is_bridge,
        }
    }

    pub fn stats(&self) -> TrafficStats {
        TrafficStats {
            recv: self.recv_stats,
            send: self.send_stats,
        }
    }

    pub fn parser_seed(&self) -> FramerSeed {
        FramerSeed {
            max_packet_size: self.max_packet_size,
            proto_version: self.proto_version,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn proto_version(&self) -> ProtocolVersion {
        self.proto_version
    }
}

/// Fold a packet through an ordered list of checks, stopping at the
/// first failing step's reason code.
pub(crate) fn run_check_steps<P>(
    packet: &P,
    proto: &Protocol,
    steps: &[fn(&P, &Protocol) -> Result<(), ReasonCode>],
) -> Result<(), ReasonCode> {
    for step in steps {
        step(packet, proto)?;
    }
    Ok(())
}
