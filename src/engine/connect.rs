//! CONNECT handshake
//!
//! Snapshot the proposed parameters, run the ordered check chain,
//! authenticate, open the session, register, arm keepalive, resolve the
//! mountpoint and acknowledge. Any failing step refuses with a CONNACK
//! carrying the (version-translated) reason code and leaves the
//! connection unregistered.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{run_check_steps, Error, Protocol};
use crate::broker::{Message, MessageHeaders};
use crate::protocol::{
    ConnAck, Connect, Packet, ProtocolVersion, QoS, ReasonCode, Will,
};
use crate::session::OpenParams;
use crate::topic::Mountpoint;

fn check_proto_version(connect: &Connect, _proto: &Protocol) -> Result<(), ReasonCode> {
    if connect.protocol_name == connect.protocol_version.protocol_name() {
        Ok(())
    } else {
        Err(ReasonCode::ProtocolError)
    }
}

fn check_client_id(connect: &Connect, proto: &Protocol) -> Result<(), ReasonCode> {
    if connect.client_id.is_empty() {
        // v3.1 has no server-assigned identifiers
        if connect.protocol_version == ProtocolVersion::V3 || !connect.clean_start {
            return Err(ReasonCode::ClientIdNotValid);
        }
        return Ok(());
    }

    if connect.client_id.len() > proto.zone.max_clientid_len {
        return Err(ReasonCode::ClientIdNotValid);
    }
    Ok(())
}

impl Protocol {
    pub(crate) async fn handle_connect(&mut self, connect: Connect) -> Result<(), Error> {
        trace!(packet = ?connect, "CONNECT");

        // Snapshot the proposed parameters; provisional until CONNACK
        self.proto_version = connect.protocol_version;
        self.proto_name = connect.protocol_name.clone();
        self.encoder.set_protocol_version(connect.protocol_version);
        self.client_id = Arc::from(connect.client_id.as_str());
        self.clean_start = connect.clean_start;
        self.keepalive = connect.keep_alive;
        self.is_bridge = connect.is_bridge;
        self.conn_props = connect.properties.clone();
        if self.username.is_none() {
            self.username = connect.username.clone();
        }
        self.connected = true;
        self.connected_at = Some((self.now_fn)());

        if let Err(code) = run_check_steps(
            &connect,
            self,
            &[check_proto_version, check_client_id],
        ) {
            debug!(
                client_id = %self.client_id,
                peer = %self.peer_address,
                %code,
                "CONNECT refused by check chain"
            );
            return self.refuse(code);
        }

        // Authenticate before anything observable happens
        let access_control = Arc::clone(&self.access_control);
        let credentials = self.credentials();
        match access_control
            .authenticate(&credentials, connect.password.as_deref())
            .await
        {
            Ok(is_super) => {
                self.is_super = is_super;
            }
            Err(e) => {
                debug!(client_id = %self.client_id, error = %e, "authentication failed");
                if let Some(metrics) = &self.metrics {
                    metrics.auth_failures_total.inc();
                }
                return self.refuse(e.reason_code());
            }
        }

        // Server-assigned identifier for empty v3.1.1/v5 clean starts
        if self.client_id.is_empty() {
            let assigned: Arc<str> = format!("gatemq-{:x}", rand_id()).into();
            self.ack_props.assigned_client_identifier = Some(assigned.to_string());
            self.client_id = assigned;
        }

        // A zone-pinned keepalive overrides the client's proposal
        if let Some(pinned) = self.zone.server_keepalive {
            self.keepalive = pinned;
            self.ack_props.server_keep_alive = Some(pinned);
        }

        let sessions = Arc::clone(&self.sessions);
        let (session, session_present) = match sessions
            .open_session(OpenParams {
                client_id: self.client_id.clone(),
                username: self.username.clone(),
                clean_start: self.clean_start,
                proto_version: self.proto_version,
                keep_alive: self.keepalive,
                conn_props: self.conn_props.clone(),
            })
            .await
        {
            Ok(opened) => opened,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "session open failed");
                self.connected = false;
                self.send_connack(ReasonCode::UnspecifiedError, false)?;
                return Err(Error::Session(e));
            }
        };
        self.session = Some(session);

        let connections = Arc::clone(&self.connections);
        connections
            .register(self.client_id.clone(), self.self_handle.clone(), self.info())
            .await;

        if self.keepalive > 0 {
            let delay = (f32::from(self.keepalive) * self.zone.keepalive_backoff).round();
            self.keepalive_timer.arm(Duration::from_secs(delay as u64));
        }

        let hooks = Arc::clone(&self.hooks);
        hooks
            .on_client_connected(&self.client(), ReasonCode::Success)
            .await;

        // Resolve mountpoint placeholders with the final identity, then
        // capture the will message under the resolved prefix
        self.mountpoint = self.zone.mountpoint.as_ref().map(|template| {
            Mountpoint::expand(template, &self.client_id, self.username.as_deref())
        });
        self.will_message = connect.will.as_ref().map(|will| self.will_to_message(will));

        if let Some(metrics) = &self.metrics {
            metrics.connections_total.inc();
        }

        let session_present = session_present && !self.clean_start;
        let mut properties = self.ack_props.clone();
        if self.proto_version == ProtocolVersion::V5 {
            let caps = self.caps();
            if caps.max_qos != QoS::ExactlyOnce {
                properties.maximum_qos = Some(caps.max_qos as u8);
            }
            properties.retain_available = Some(u8::from(caps.retain_available));
            properties.maximum_packet_size = Some(caps.max_packet_size);
            properties.wildcard_subscription_available =
                Some(u8::from(caps.wildcard_subscription_available));
            properties.shared_subscription_available =
                Some(u8::from(caps.shared_subscription_available));
        }

        debug!(
            client_id = %self.client_id,
            peer = %self.peer_address,
            protocol = %self.proto_name,
            version = ?self.proto_version,
            session_present,
            "connected"
        );

        self.send_packet(&Packet::ConnAck(ConnAck {
            session_present,
            reason_code: ReasonCode::Success,
            properties,
        }))
    }

    /// Negative CONNACK plus the matching error; nothing was registered
    fn refuse(&mut self, code: ReasonCode) -> Result<(), Error> {
        self.connected = false;
        self.send_connack(code, false)?;
        Err(match code {
            ReasonCode::ClientIdNotValid => Error::ClientIdNotValid,
            ReasonCode::NotAuthorized
            | ReasonCode::BadUserNameOrPassword
            | ReasonCode::Banned => Error::NotAuthorized,
            other => Error::Protocol(other),
        })
    }

    fn send_connack(&mut self, reason_code: ReasonCode, session_present: bool) -> Result<(), Error> {
        self.send_packet(&Packet::ConnAck(ConnAck {
            session_present,
            reason_code,
            properties: Default::default(),
        }))
    }

    fn will_to_message(&self, will: &Will) -> Message {
        Message {
            publisher: self.client_id.clone(),
            topic: self.mount_topic(&will.topic).into(),
            payload: will.payload.clone(),
            qos: will.qos,
            retain: will.retain,
            dup: false,
            headers: MessageHeaders::default(),
            properties: will.properties.clone(),
            timestamp: (self.now_fn)(),
        }
    }
}

/// Random identifier suffix for server-assigned client ids
fn rand_id() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    RandomState::new().build_hasher().finish()
}
