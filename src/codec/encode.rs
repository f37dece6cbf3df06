//! Outbound MQTT packet encoder
//!
//! Version-aware: pre-v5 packets carry translated return codes and omit
//! property blocks. Only server-to-client packet kinds are encodable.

use bytes::{BufMut, BytesMut};

use super::{variable_int_len, write_string, write_variable_int};
use crate::protocol::{
    ConnAck, Disconnect, EncodeError, Packet, ProtocolVersion, PubAck, PubComp, PubRec, PubRel,
    Publish, QoS, ReasonCode, SubAck, UnsubAck,
};

/// MQTT packet encoder bound to a negotiated protocol version
pub struct Encoder {
    protocol_version: ProtocolVersion,
}

impl Encoder {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            protocol_version: version,
        }
    }

    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.protocol_version = version;
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    fn is_v5(&self) -> bool {
        self.protocol_version == ProtocolVersion::V5
    }

    /// Encode a packet into the buffer
    pub fn encode(&self, packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match packet {
            Packet::ConnAck(p) => self.encode_connack(p, buf),
            Packet::Publish(p) => self.encode_publish(p, buf),
            Packet::PubAck(p) => self.encode_ack(0x40, p.packet_id, p.reason_code, buf),
            Packet::PubRec(p) => self.encode_ack(0x50, p.packet_id, p.reason_code, buf),
            Packet::PubRel(p) => self.encode_ack(0x62, p.packet_id, p.reason_code, buf),
            Packet::PubComp(p) => self.encode_ack(0x70, p.packet_id, p.reason_code, buf),
            Packet::SubAck(p) => self.encode_suback(p, buf),
            Packet::UnsubAck(p) => self.encode_unsuback(p, buf),
            Packet::PingResp => {
                buf.put_u8(0xD0);
                buf.put_u8(0x00);
                Ok(())
            }
            Packet::Disconnect(p) => self.encode_disconnect(p, buf),
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingReq => Err(EncodeError::ClientOnlyPacket),
        }
    }

    fn encode_connack(&self, packet: &ConnAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let mut remaining_length = 2; // acknowledge flags + return code

        if self.is_v5() {
            let props_len = packet.properties.encoded_size();
            remaining_length += variable_int_len(props_len as u32) + props_len;
        }

        buf.put_u8(0x20);
        write_variable_int(buf, remaining_length as u32)?;
        buf.put_u8(u8::from(packet.session_present));

        if self.is_v5() {
            buf.put_u8(packet.reason_code as u8);
            packet.properties.encode(buf)?;
        } else {
            buf.put_u8(packet.reason_code.to_v3_connack_code());
        }

        Ok(())
    }

    fn encode_publish(&self, packet: &Publish, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let mut remaining_length = 2 + packet.topic.len();

        if packet.qos != QoS::AtMostOnce {
            remaining_length += 2;
        }
        if self.is_v5() {
            let props_len = packet.properties.encoded_size();
            remaining_length += variable_int_len(props_len as u32) + props_len;
        }
        remaining_length += packet.payload.len();

        let mut first_byte: u8 = 0x30;
        if packet.dup {
            first_byte |= 0x08;
        }
        first_byte |= (packet.qos as u8) << 1;
        if packet.retain {
            first_byte |= 0x01;
        }
        buf.put_u8(first_byte);
        write_variable_int(buf, remaining_length as u32)?;

        write_string(buf, &packet.topic)?;
        if let Some(packet_id) = packet.packet_id {
            buf.put_u16(packet_id);
        }
        if self.is_v5() {
            packet.properties.encode(buf)?;
        }
        buf.put_slice(&packet.payload);

        Ok(())
    }

    /// Common shape of PUBACK/PUBREC/PUBREL/PUBCOMP: pre-v5 the reason
    /// code never hits the wire; v5 omits it when it is Success.
    fn encode_ack(
        &self,
        first_byte: u8,
        packet_id: u16,
        reason_code: ReasonCode,
        buf: &mut BytesMut,
    ) -> Result<(), EncodeError> {
        if self.is_v5() && reason_code != ReasonCode::Success {
            buf.put_u8(first_byte);
            buf.put_u8(0x03);
            buf.put_u16(packet_id);
            buf.put_u8(reason_code as u8);
        } else {
            buf.put_u8(first_byte);
            buf.put_u8(0x02);
            buf.put_u16(packet_id);
        }
        Ok(())
    }

    fn encode_suback(&self, packet: &SubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let mut remaining_length = 2;

        if self.is_v5() {
            let props_len = packet.properties.encoded_size();
            remaining_length += variable_int_len(props_len as u32) + props_len;
        }
        remaining_length += packet.reason_codes.len();

        buf.put_u8(0x90);
        write_variable_int(buf, remaining_length as u32)?;
        buf.put_u16(packet.packet_id);

        if self.is_v5() {
            packet.properties.encode(buf)?;
        }
        for code in &packet.reason_codes {
            if self.is_v5() {
                buf.put_u8(*code as u8);
            } else {
                buf.put_u8(code.to_v3_suback_code());
            }
        }

        Ok(())
    }

    fn encode_unsuback(&self, packet: &UnsubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
        if self.is_v5() {
            let props_len = packet.properties.encoded_size();
            let remaining_length =
                2 + variable_int_len(props_len as u32) + props_len + packet.reason_codes.len();

            buf.put_u8(0xB0);
            write_variable_int(buf, remaining_length as u32)?;
            buf.put_u16(packet.packet_id);
            packet.properties.encode(buf)?;
            for code in &packet.reason_codes {
                buf.put_u8(*code as u8);
            }
        } else {
            // Pre-v5 UNSUBACK has no payload
            buf.put_u8(0xB0);
            buf.put_u8(0x02);
            buf.put_u16(packet.packet_id);
        }

        Ok(())
    }

    fn encode_disconnect(
        &self,
        packet: &Disconnect,
        buf: &mut BytesMut,
    ) -> Result<(), EncodeError> {
        if self.is_v5() && packet.reason_code != ReasonCode::Success {
            let props_len = packet.properties.encoded_size();
            let has_props = props_len > 0;
            let remaining_length = if has_props {
                1 + variable_int_len(props_len as u32) + props_len
            } else {
                1
            };

            buf.put_u8(0xE0);
            write_variable_int(buf, remaining_length as u32)?;
            buf.put_u8(packet.reason_code as u8);
            if has_props {
                packet.properties.encode(buf)?;
            }
        } else {
            buf.put_u8(0xE0);
            buf.put_u8(0x00);
        }

        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(ProtocolVersion::V311)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Properties;

    #[test]
    fn connack_v311_translates_reason() {
        let encoder = Encoder::new(ProtocolVersion::V311);
        let connack = ConnAck {
            session_present: false,
            reason_code: ReasonCode::ClientIdNotValid,
            properties: Properties::default(),
        };
        let mut buf = BytesMut::new();
        encoder.encode(&Packet::ConnAck(connack), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x20, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn connack_v5_keeps_reason_byte() {
        let encoder = Encoder::new(ProtocolVersion::V5);
        let connack = ConnAck {
            session_present: true,
            reason_code: ReasonCode::Success,
            properties: Properties::default(),
        };
        let mut buf = BytesMut::new();
        encoder.encode(&Packet::ConnAck(connack), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x20, 0x03, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn puback_v5_success_omits_reason() {
        let encoder = Encoder::new(ProtocolVersion::V5);
        let mut buf = BytesMut::new();
        encoder
            .encode(&Packet::PubAck(PubAck::new(7)), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x40, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn puback_v5_error_carries_reason() {
        let encoder = Encoder::new(ProtocolVersion::V5);
        let mut buf = BytesMut::new();
        encoder
            .encode(
                &Packet::PubAck(PubAck::with_reason(7, ReasonCode::NotAuthorized)),
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], &[0x40, 0x03, 0x00, 0x07, 0x87]);
    }

    #[test]
    fn pubrel_uses_mandatory_flags() {
        let encoder = Encoder::new(ProtocolVersion::V311);
        let mut buf = BytesMut::new();
        encoder
            .encode(&Packet::PubRel(PubRel::new(9)), &mut buf)
            .unwrap();
        assert_eq!(buf[0], 0x62);
    }

    #[test]
    fn suback_v3_maps_failure_to_0x80() {
        let encoder = Encoder::new(ProtocolVersion::V3);
        let suback = SubAck {
            packet_id: 3,
            reason_codes: vec![ReasonCode::GrantedQoS1, ReasonCode::NotAuthorized],
            properties: Properties::default(),
        };
        let mut buf = BytesMut::new();
        encoder.encode(&Packet::SubAck(suback), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x90, 0x04, 0x00, 0x03, 0x01, 0x80]);
    }

    #[test]
    fn publish_sets_flags_and_packet_id() {
        let encoder = Encoder::new(ProtocolVersion::V311);
        let publish = Publish {
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: "t".into(),
            packet_id: Some(1),
            payload: bytes::Bytes::from_static(b"x"),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        encoder.encode(&Packet::Publish(publish), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x33, 0x06, 0x00, 0x01, b't', 0x00, 0x01, b'x']);
    }

    #[test]
    fn client_only_packets_refused() {
        let encoder = Encoder::new(ProtocolVersion::V311);
        let mut buf = BytesMut::new();
        assert_eq!(
            encoder.encode(&Packet::PingReq, &mut buf),
            Err(EncodeError::ClientOnlyPacket)
        );
    }
}
