//! GateMQ - per-connection MQTT protocol engine
//!
//! The protocol state machine a broker runs for each client connection:
//! CONNECT handshake, publish/subscribe pipelines, per-QoS
//! acknowledgements, will-message lifecycle, mountpoint rewriting and
//! version-aware reason-code translation for MQTT v3.1, v3.1.1 and v5.0.
//!
//! Transport, the session store and the routing fabric stay outside;
//! the engine talks to them through the collaborator traits in this
//! crate and emits serialized packets through an injected send function.

pub mod auth;
pub mod broker;
pub mod codec;
pub mod config;
pub mod engine;
pub mod hooks;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod topic;
pub mod zone;

pub use auth::{AccessControl, AllowAll, StaticAccessControl};
pub use broker::{Broker, Message};
pub use config::Config;
pub use engine::{
    ClientInfo, Deliver, DisconnectReason, Error, FramerSeed, Init, KeepaliveTimer,
    NoopKeepalive, PeerCertificate, Protocol, SendFn, Stats, TrafficStats,
};
pub use hooks::{CompositeHooks, DefaultHooks, Hooks};
pub use metrics::Metrics;
pub use protocol::{ProtocolVersion, QoS, ReasonCode};
pub use registry::{ConnectionHandle, ConnectionManager, InMemoryRegistry};
pub use session::{Session, SessionManager};
pub use zone::Zone;
