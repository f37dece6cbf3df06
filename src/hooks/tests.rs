//! Hooks module tests

use std::net::SocketAddr;

use super::*;
use crate::protocol::{ProtocolVersion, SubscriptionOptions};

fn client() -> ClientInfo {
    ClientInfo {
        client_id: "c1".into(),
        username: Some("user".to_string()),
        peer_address: "127.0.0.1:49152".parse::<SocketAddr>().unwrap(),
        proto_version: ProtocolVersion::V311,
        is_bridge: false,
    }
}

fn filters() -> Vec<ParsedFilter> {
    vec![crate::topic::parse("a/#", SubscriptionOptions::default()).unwrap()]
}

#[tokio::test]
async fn default_hooks_pass_through() {
    let hooks = DefaultHooks;
    assert_eq!(
        hooks.on_client_subscribe(&client(), &filters()).await,
        HookFlow::Continue
    );
    assert_eq!(
        hooks.on_client_unsubscribe(&client(), &["a".to_string()]).await,
        HookFlow::Continue
    );
}

struct StopSubscribe;

#[async_trait]
impl Hooks for StopSubscribe {
    async fn on_client_subscribe(
        &self,
        _client: &ClientInfo,
        _filters: &[ParsedFilter],
    ) -> HookFlow {
        HookFlow::Stop
    }
}

#[tokio::test]
async fn composite_short_circuits_on_stop() {
    let hooks = CompositeHooks::new().with(DefaultHooks).with(StopSubscribe);
    assert_eq!(
        hooks.on_client_subscribe(&client(), &filters()).await,
        HookFlow::Stop
    );
    // The unsubscribe chain is untouched by the subscribe stop
    assert_eq!(
        hooks.on_client_unsubscribe(&client(), &["a".to_string()]).await,
        HookFlow::Continue
    );
}

struct CountingHooks(std::sync::atomic::AtomicUsize);

#[async_trait]
impl Hooks for CountingHooks {
    async fn on_client_connected(&self, _client: &ClientInfo, _reason: crate::protocol::ReasonCode) {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[tokio::test]
async fn notification_chains_run_every_link() {
    let first = std::sync::Arc::new(CountingHooks(Default::default()));
    let second = std::sync::Arc::new(CountingHooks(Default::default()));
    let hooks = CompositeHooks::new()
        .with(first.clone())
        .with(second.clone());

    hooks
        .on_client_connected(&client(), crate::protocol::ReasonCode::Success)
        .await;

    assert_eq!(first.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(second.0.load(std::sync::atomic::Ordering::SeqCst), 1);
}
