//! Inbound PUBLISH pipeline
//!
//! Capability check, then ACL, then conversion to the internal message
//! form with the mountpoint applied and hand-off to the session. The
//! acknowledgement (or the rejection carrying a reason code) follows
//! the packet's QoS.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{run_check_steps, Error, Protocol};
use crate::auth::{AclAction, Access};
use crate::broker::Message;
use crate::protocol::{Packet, PubAck, PubRec, Publish, QoS, ReasonCode};

fn check_pub_caps(publish: &Publish, proto: &Protocol) -> Result<(), ReasonCode> {
    proto.zone.check_pub(publish.qos, publish.retain)
}

impl Protocol {
    pub(crate) async fn handle_publish(&mut self, publish: Publish) -> Result<(), Error> {
        trace!(
            client_id = %self.client_id,
            topic = %publish.topic,
            qos = publish.qos as u8,
            "PUBLISH"
        );

        if let Err(code) = self.check_publish(&publish).await {
            return self.reject_publish(&publish, code);
        }

        let mounted: Arc<str> = self.mount_topic(&publish.topic).into();
        let message =
            Message::from_publish(self.client_id.clone(), mounted, &publish, (self.now_fn)());

        let session = match &self.session {
            Some(session) => Arc::clone(session),
            None => return Err(Error::NotConnected),
        };
        if let Err(e) = session.publish(publish.packet_id, message).await {
            warn!(client_id = %self.client_id, error = %e, "session rejected publish");
            return self.reject_publish(&publish, ReasonCode::UnspecifiedError);
        }

        match publish.qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => {
                self.send_packet(&Packet::PubAck(PubAck::new(publish.packet_id.unwrap())))
            }
            QoS::ExactlyOnce => {
                self.send_packet(&Packet::PubRec(PubRec::new(publish.packet_id.unwrap())))
            }
        }
    }

    async fn check_publish(&self, publish: &Publish) -> Result<(), ReasonCode> {
        run_check_steps(publish, self, &[check_pub_caps])?;

        if self.enable_acl && !self.is_super {
            let verdict = self
                .access_control
                .check_acl(&self.credentials(), AclAction::Publish, &publish.topic)
                .await;
            if verdict == Access::Deny {
                if let Some(metrics) = &self.metrics {
                    metrics.acl_denials_total.inc();
                }
                return Err(ReasonCode::NotAuthorized);
            }
        }
        Ok(())
    }

    /// Surface a refused publish to the client: QoS 0 is swallowed,
    /// QoS 1/2 acknowledge with the failure code.
    fn reject_publish(&mut self, publish: &Publish, code: ReasonCode) -> Result<(), Error> {
        debug!(
            client_id = %self.client_id,
            topic = %publish.topic,
            %code,
            "publish refused"
        );

        match publish.qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => self.send_packet(&Packet::PubAck(PubAck::with_reason(
                publish.packet_id.unwrap(),
                code,
            ))),
            QoS::ExactlyOnce => self.send_packet(&Packet::PubRec(PubRec::with_reason(
                publish.packet_id.unwrap(),
                code,
            ))),
        }
    }
}
