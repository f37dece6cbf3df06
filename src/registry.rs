//! Connection registry
//!
//! Maps client identifiers to live connection handles so the broker can
//! push deliver events at a connection and kick stale ones on takeover.
//! The engine registers itself after a successful handshake and
//! unregisters during shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::Deliver;
use crate::protocol::{ProtocolVersion, ReasonCode};

/// Snapshot of a connection's negotiated parameters kept alongside its
/// handle in the registry
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_address: SocketAddr,
    pub proto_version: ProtocolVersion,
    pub username: Option<String>,
    pub clean_start: bool,
    pub keepalive: u16,
    pub is_bridge: bool,
    pub connected_at: Option<SystemTime>,
}

/// Handle through which deliver events reach a connection's owning task
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    events: mpsc::UnboundedSender<Deliver>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving end the owning task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Deliver>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    /// Push a deliver event; false when the owning task is gone
    pub fn deliver(&self, event: Deliver) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Registry of live connections keyed by client identifier
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn register(&self, client_id: Arc<str>, handle: ConnectionHandle, info: ConnectionInfo);

    async fn unregister(&self, client_id: &str);
}

/// In-process registry backed by a concurrent map.
///
/// Registering an already-present client id hands the previous handle a
/// `Disconnect{SessionTakenOver}` before replacing it.
pub struct InMemoryRegistry {
    connections: DashMap<Arc<str>, (ConnectionHandle, ConnectionInfo)>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, client_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(client_id).map(|e| e.value().0.clone())
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionManager for InMemoryRegistry {
    async fn register(&self, client_id: Arc<str>, handle: ConnectionHandle, info: ConnectionInfo) {
        if let Some(previous) = self.connections.insert(client_id.clone(), (handle, info)) {
            debug!(client_id = %client_id, "session taken over");
            previous.0.deliver(Deliver::Disconnect {
                reason: ReasonCode::SessionTakenOver,
            });
        }
    }

    async fn unregister(&self, client_id: &str) {
        self.connections.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            peer_address: "127.0.0.1:50000".parse().unwrap(),
            proto_version: ProtocolVersion::V311,
            username: None,
            clean_start: true,
            keepalive: 60,
            is_bridge: false,
            connected_at: Some(SystemTime::UNIX_EPOCH),
        }
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = InMemoryRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel();

        registry.register("c1".into(), handle, info()).await;
        assert_eq!(registry.len(), 1);
        assert!(registry.get("c1").is_some());

        registry.unregister("c1").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn takeover_notifies_previous_handle() {
        let registry = InMemoryRegistry::new();
        let (first, mut first_rx) = ConnectionHandle::channel();
        let (second, _second_rx) = ConnectionHandle::channel();

        registry.register("c1".into(), first, info()).await;
        registry.register("c1".into(), second, info()).await;

        match first_rx.try_recv() {
            Ok(Deliver::Disconnect { reason }) => {
                assert_eq!(reason, ReasonCode::SessionTakenOver)
            }
            other => panic!("expected takeover disconnect, got {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn deliver_to_dropped_task_reports_failure() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);
        assert!(!handle.deliver(Deliver::Disconnect {
            reason: ReasonCode::Success,
        }));
    }
}
