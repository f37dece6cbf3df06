//! Protocol error types

use std::fmt;

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Packet exceeds the maximum remaining length
    PacketTooLarge,
    /// String exceeds 65535 bytes
    StringTooLong,
    /// Binary field exceeds 65535 bytes
    BinaryTooLong,
    /// Packet kind only travels client-to-server, never emitted here
    ClientOnlyPacket,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet too large"),
            Self::StringTooLong => write!(f, "string too long"),
            Self::BinaryTooLong => write!(f, "binary field too long"),
            Self::ClientOnlyPacket => write!(f, "packet kind is client-to-server only"),
        }
    }
}

impl std::error::Error for EncodeError {}
