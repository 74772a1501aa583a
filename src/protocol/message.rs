//! Message envelope
//!
//! The outer container written into a frame's command section. It carries
//! the authentication data and the serialized inner [`Command`]. Only the
//! command bytes are signed, never the envelope itself.

use serde::{Deserialize, Serialize};

use super::Command;

/// How a message is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    /// Keyed digest over the command bytes
    HmacAuth,

    /// Raw PIN, used by erase and lock operations
    PinAuth,

    /// Server-initiated frame that answers no request
    UnsolicitedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacAuth {
    pub identity: i64,
    pub hmac: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinAuth {
    pub pin: Vec<u8>,
}

/// Outer wire container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub auth_type: AuthType,
    pub hmac_auth: Option<HmacAuth>,
    pub pin_auth: Option<PinAuth>,
    pub command_bytes: Vec<u8>,
}

impl Message {
    /// Envelope for a request authenticated by HMAC; the digest is attached
    /// by the sender once the command is final
    pub fn hmac() -> Self {
        Self {
            auth_type: AuthType::HmacAuth,
            hmac_auth: None,
            pin_auth: None,
            command_bytes: Vec::new(),
        }
    }

    /// Envelope for a request authenticated by PIN
    pub fn pin(pin: impl Into<Vec<u8>>) -> Self {
        Self {
            auth_type: AuthType::PinAuth,
            hmac_auth: None,
            pin_auth: Some(PinAuth { pin: pin.into() }),
            command_bytes: Vec::new(),
        }
    }

    /// Envelope the drive uses for its unsolicited status frames
    pub fn unsolicited() -> Self {
        Self {
            auth_type: AuthType::UnsolicitedStatus,
            hmac_auth: None,
            pin_auth: None,
            command_bytes: Vec::new(),
        }
    }

    /// The digest carried by the envelope, if any
    pub fn hmac_digest(&self) -> Option<&[u8]> {
        self.hmac_auth.as_ref().map(|auth| auth.hmac.as_slice())
    }

    /// Serialize the envelope for the command section of a frame
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    /// Parse an envelope from the command section of a frame
    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }

    /// Parse the inner command
    pub fn command(&self) -> bincode::Result<Command> {
        decode_command(&self.command_bytes)
    }
}

/// Serialize a command into the bytes that get signed and embedded
pub fn encode_command(command: &Command) -> bincode::Result<Vec<u8>> {
    bincode::serialize(command)
}

/// Parse a command from its serialized bytes
pub fn decode_command(bytes: &[u8]) -> bincode::Result<Command> {
    bincode::deserialize(bytes)
}
