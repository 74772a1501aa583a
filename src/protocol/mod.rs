//! Protocol Module
//!
//! Defines the wire protocol spoken with the drive.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────────┬──────────────┬──────────────┬──────────────┐
//! │ 'F' (1)  │ CmdLen (4)   │ ValLen (4)   │   Message    │    Value     │
//! └──────────┴──────────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Both lengths are big-endian. The message section holds a serialized
//! [`Message`] envelope, which in turn holds the serialized [`Command`]. The
//! value section carries raw value bytes (record values, firmware images).
//!
//! ## Correlation
//! Every request command carries a `sequence`; the drive echoes it as
//! `ack_sequence` in the response. Responses may arrive in any order.

mod command;
mod message;
mod codec;

pub use command::{
    Acl, Algorithm, Batch, Body, Capacity, Command, Configuration, DriveLog, GetLog, Header,
    HmacAlgorithm, KeyValue, Limits, LogType, MessageType, P2POp, P2POperation, Peer,
    Permission, PinOpType, PinOperation, Priority, Range, Scope, Security, Setup, Statistics,
    Status, Synchronization, Temperature, Utilization, WireStatusCode,
};
pub use message::{decode_command, encode_command, AuthType, HmacAuth, Message, PinAuth};
pub use codec::{
    check_frame_lengths, encode_frame, DecodeStatus, EncodeStatus, FrameError, FrameReader,
    FrameWriter, RawFrame, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE,
};
