//! Lifecycle and message hooks
//!
//! Named hook chains the engine runs at protocol milestones. Chains
//! either run to completion or are stopped by a link; the engine maps a
//! `Stop` on the subscribe/unsubscribe chains to an
//! implementation-specific error for every filter in the packet.

use async_trait::async_trait;

use crate::broker::Message;
use crate::engine::{ClientInfo, DisconnectReason};
use crate::protocol::ReasonCode;
use crate::topic::ParsedFilter;

#[cfg(test)]
mod tests;

/// Outcome of a flow-controlling hook chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    /// Continue with the operation
    Continue,
    /// Abort the operation
    Stop,
}

/// Broker hook points, all defaulting to pass-through
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Runs after a successful handshake, before CONNACK is emitted
    async fn on_client_connected(&self, _client: &ClientInfo, _reason: ReasonCode) {}

    /// Runs during shutdown with the terminal reason
    async fn on_client_disconnected(&self, _client: &ClientInfo, _reason: &DisconnectReason) {}

    /// Runs before a SUBSCRIBE reaches the session; `Stop` aborts the
    /// whole packet
    async fn on_client_subscribe(
        &self,
        _client: &ClientInfo,
        _filters: &[ParsedFilter],
    ) -> HookFlow {
        HookFlow::Continue
    }

    /// Runs before an UNSUBSCRIBE reaches the session; `Stop` aborts
    /// the whole packet
    async fn on_client_unsubscribe(&self, _client: &ClientInfo, _filters: &[String]) -> HookFlow {
        HookFlow::Continue
    }

    /// Runs for every message about to be written to this client
    async fn on_message_delivered(&self, _client: &ClientInfo, _message: &Message) {}
}

/// Hooks implementation with every chain empty
pub struct DefaultHooks;

#[async_trait]
impl Hooks for DefaultHooks {
    // All methods use default implementations (pass-through, no-op)
}

impl Default for DefaultHooks {
    fn default() -> Self {
        Self
    }
}

/// Allow Arc-wrapped hook providers to be used directly
#[async_trait]
impl<T: Hooks + ?Sized> Hooks for std::sync::Arc<T> {
    async fn on_client_connected(&self, client: &ClientInfo, reason: ReasonCode) {
        (**self).on_client_connected(client, reason).await;
    }

    async fn on_client_disconnected(&self, client: &ClientInfo, reason: &DisconnectReason) {
        (**self).on_client_disconnected(client, reason).await;
    }

    async fn on_client_subscribe(
        &self,
        client: &ClientInfo,
        filters: &[ParsedFilter],
    ) -> HookFlow {
        (**self).on_client_subscribe(client, filters).await
    }

    async fn on_client_unsubscribe(&self, client: &ClientInfo, filters: &[String]) -> HookFlow {
        (**self).on_client_unsubscribe(client, filters).await
    }

    async fn on_message_delivered(&self, client: &ClientInfo, message: &Message) {
        (**self).on_message_delivered(client, message).await;
    }
}

/// Chains multiple hook implementations in registration order.
///
/// Flow-controlling chains short-circuit on the first `Stop`;
/// notification chains always run every link.
pub struct CompositeHooks {
    hooks: Vec<Box<dyn Hooks>>,
}

impl CompositeHooks {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add<H: Hooks + 'static>(&mut self, hooks: H) {
        self.hooks.push(Box::new(hooks));
    }

    pub fn with<H: Hooks + 'static>(mut self, hooks: H) -> Self {
        self.add(hooks);
        self
    }
}

impl Default for CompositeHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hooks for CompositeHooks {
    async fn on_client_connected(&self, client: &ClientInfo, reason: ReasonCode) {
        for hooks in &self.hooks {
            hooks.on_client_connected(client, reason).await;
        }
    }

    async fn on_client_disconnected(&self, client: &ClientInfo, reason: &DisconnectReason) {
        for hooks in &self.hooks {
            hooks.on_client_disconnected(client, reason).await;
        }
    }

    async fn on_client_subscribe(
        &self,
        client: &ClientInfo,
        filters: &[ParsedFilter],
    ) -> HookFlow {
        for hooks in &self.hooks {
            if hooks.on_client_subscribe(client, filters).await == HookFlow::Stop {
                return HookFlow::Stop;
            }
        }
        HookFlow::Continue
    }

    async fn on_client_unsubscribe(&self, client: &ClientInfo, filters: &[String]) -> HookFlow {
        for hooks in &self.hooks {
            if hooks.on_client_unsubscribe(client, filters).await == HookFlow::Stop {
                return HookFlow::Stop;
            }
        }
        HookFlow::Continue
    }

    async fn on_message_delivered(&self, client: &ClientInfo, message: &Message) {
        for hooks in &self.hooks {
            hooks.on_message_delivered(client, message).await;
        }
    }
}
