//! QoS acknowledgement routing, PINGREQ and client DISCONNECT
//!
//! Inbound acknowledgements are forwarded to the session; PUBREC and
//! PUBREL additionally drive the next step of the QoS 2 exchange.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{Error, Protocol};
use crate::protocol::{
    Disconnect, Packet, PubAck, PubComp, PubRec, PubRel, ProtocolVersion, ReasonCode,
};
use crate::session::SessionHandle;

impl Protocol {
    fn session(&self) -> Result<SessionHandle, Error> {
        match &self.session {
            Some(session) => Ok(Arc::clone(session)),
            None => Err(Error::NotConnected),
        }
    }

    pub(crate) async fn handle_puback(&mut self, puback: PubAck) -> Result<(), Error> {
        if let Err(e) = self
            .session()?
            .puback(puback.packet_id, puback.reason_code)
            .await
        {
            trace!(packet_id = puback.packet_id, error = %e, "session dropped puback");
        }
        Ok(())
    }

    pub(crate) async fn handle_pubrec(&mut self, pubrec: PubRec) -> Result<(), Error> {
        if let Err(e) = self
            .session()?
            .pubrec(pubrec.packet_id, pubrec.reason_code)
            .await
        {
            trace!(packet_id = pubrec.packet_id, error = %e, "session dropped pubrec");
        }
        self.send_packet(&Packet::PubRel(PubRel::new(pubrec.packet_id)))
    }

    pub(crate) async fn handle_pubrel(&mut self, pubrel: PubRel) -> Result<(), Error> {
        if let Err(e) = self
            .session()?
            .pubrel(pubrel.packet_id, pubrel.reason_code)
            .await
        {
            trace!(packet_id = pubrel.packet_id, error = %e, "session dropped pubrel");
        }
        self.send_packet(&Packet::PubComp(PubComp::new(pubrel.packet_id)))
    }

    pub(crate) async fn handle_pubcomp(&mut self, pubcomp: PubComp) -> Result<(), Error> {
        if let Err(e) = self
            .session()?
            .pubcomp(pubcomp.packet_id, pubcomp.reason_code)
            .await
        {
            trace!(packet_id = pubcomp.packet_id, error = %e, "session dropped pubcomp");
        }
        Ok(())
    }

    pub(crate) fn handle_pingreq(&mut self) -> Result<(), Error> {
        self.send_packet(&Packet::PingResp)
    }

    /// Graceful client DISCONNECT. The will is dropped unless a v5
    /// client explicitly disconnects with it [MQTT-3.1.2-10].
    pub(crate) fn handle_client_disconnect(
        &mut self,
        disconnect: Disconnect,
    ) -> Result<(), Error> {
        debug!(
            client_id = %self.client_id,
            reason = %disconnect.reason_code,
            "DISCONNECT"
        );

        let keep_will = self.proto_version == ProtocolVersion::V5
            && disconnect.reason_code == ReasonCode::DisconnectWithWill;
        if !keep_will {
            self.will_message = None;
        }

        Err(Error::Closed)
    }
}
