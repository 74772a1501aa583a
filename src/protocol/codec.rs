//! Protocol codec
//!
//! Frame encoding plus the resumable reader/writer state machines that move
//! frames across a non-blocking transport.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────────┬──────────────┬─────────────────┬───────────────┐
//! │ 'F' (1)  │ CmdLen (4)   │ ValLen (4)   │ Command bytes   │ Value bytes   │
//! └──────────┴──────────────┴──────────────┴─────────────────┴───────────────┘
//! ```
//!
//! Reads and writes resume exactly where the previous call stopped; no
//! partial state is ever dropped on a would-block.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::network::{IoOutcome, Transport};

/// First byte of every frame
pub const MAGIC: u8 = b'F';

/// Header size: magic (1) + command length (4) + value length (4)
pub const HEADER_SIZE: usize = 9;

/// Default bound on command + value bytes of an incoming frame (2 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Scratch size used when skipping the body of an oversized frame
const DISCARD_CHUNK: usize = 4096;

/// Fatal framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid magic byte 0x{0:02x}")]
    InvalidMagic(u8),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("{what} of {len} bytes does not fit a frame length")]
    PayloadTooLarge { what: &'static str, len: usize },
}

/// A fully read frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub command: Bytes,
    pub value: Bytes,
}

/// Outcome of a [`FrameReader::read`] call
#[derive(Debug)]
pub enum DecodeStatus {
    /// The transport would block; call again once readable
    InProgress,

    /// A complete frame is available
    Done(RawFrame),

    /// The frame exceeded the configured maximum and its oversized part was
    /// skipped. `command` holds the command bytes when they alone fit.
    TooLarge {
        command: Option<Bytes>,
        command_len: u32,
        value_len: u32,
    },

    /// The stream is unusable
    Failed(FrameError),
}

/// Outcome of a [`FrameWriter::write`] call
#[derive(Debug)]
pub enum EncodeStatus {
    InProgress,
    Done,
    Failed(FrameError),
}

// =============================================================================
// Encoding
// =============================================================================

/// Largest command or value a frame header can describe
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Check both lengths fit the header's u32 fields
pub fn check_frame_lengths(command_len: usize, value_len: usize) -> Result<(), FrameError> {
    if command_len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            what: "command",
            len: command_len,
        });
    }
    if value_len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            what: "value",
            len: value_len,
        });
    }
    Ok(())
}

/// Encode a frame to bytes
///
/// Format: magic (1) + command_len (4) + value_len (4) + command + value.
/// Lengths must pass [`check_frame_lengths`].
pub fn encode_frame(command: &[u8], value: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + command.len() + value.len());
    buf.put_u8(MAGIC);
    buf.put_u32(command.len() as u32);
    buf.put_u32(value.len() as u32);
    buf.put_slice(command);
    buf.put_slice(value);
    buf.freeze()
}

// =============================================================================
// Reading
// =============================================================================

enum Fill {
    Complete,
    Pending,
    Failed(io::Error),
}

/// Read into `buf[*filled..]` until it is full or the transport stops
fn fill(transport: &mut dyn Transport, buf: &mut [u8], filled: &mut usize) -> Fill {
    while *filled < buf.len() {
        match transport.read(&mut buf[*filled..]) {
            IoOutcome::Progress(0) | IoOutcome::WouldBlock => return Fill::Pending,
            IoOutcome::Progress(n) => *filled += n,
            IoOutcome::Failed(e) => return Fill::Failed(e),
        }
    }
    Fill::Complete
}

enum ReadState {
    Magic,
    CommandLen {
        buf: [u8; 4],
        filled: usize,
    },
    ValueLen {
        command_len: u32,
        buf: [u8; 4],
        filled: usize,
    },
    Command {
        buf: Vec<u8>,
        filled: usize,
        value_len: u32,
        skip_value: bool,
    },
    Value {
        command: Bytes,
        buf: Vec<u8>,
        filled: usize,
    },
    Discard {
        remaining: u64,
        command: Option<Bytes>,
        command_len: u32,
        value_len: u32,
    },
}

/// Resumable frame decoder
pub struct FrameReader {
    max_frame_size: usize,
    state: ReadState,
}

impl FrameReader {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            state: ReadState::Magic,
        }
    }

    /// Whether a frame has been partially read
    pub fn in_progress(&self) -> bool {
        !matches!(self.state, ReadState::Magic)
    }

    /// Advance as far as the transport allows
    pub fn read(&mut self, transport: &mut dyn Transport) -> DecodeStatus {
        loop {
            let state = std::mem::replace(&mut self.state, ReadState::Magic);
            self.state = match state {
                ReadState::Magic => {
                    let mut byte = [0u8; 1];
                    match transport.read(&mut byte) {
                        IoOutcome::Progress(0) | IoOutcome::WouldBlock => {
                            return DecodeStatus::InProgress
                        }
                        IoOutcome::Progress(_) if byte[0] == MAGIC => ReadState::CommandLen {
                            buf: [0u8; 4],
                            filled: 0,
                        },
                        IoOutcome::Progress(_) => {
                            return DecodeStatus::Failed(FrameError::InvalidMagic(byte[0]))
                        }
                        IoOutcome::Failed(e) => return DecodeStatus::Failed(e.into()),
                    }
                }

                ReadState::CommandLen { mut buf, mut filled } => {
                    match fill(transport, &mut buf, &mut filled) {
                        Fill::Complete => ReadState::ValueLen {
                            command_len: u32::from_be_bytes(buf),
                            buf: [0u8; 4],
                            filled: 0,
                        },
                        Fill::Pending => {
                            self.state = ReadState::CommandLen { buf, filled };
                            return DecodeStatus::InProgress;
                        }
                        Fill::Failed(e) => return DecodeStatus::Failed(e.into()),
                    }
                }

                ReadState::ValueLen {
                    command_len,
                    mut buf,
                    mut filled,
                } => match fill(transport, &mut buf, &mut filled) {
                    Fill::Complete => self.body_state(command_len, u32::from_be_bytes(buf)),
                    Fill::Pending => {
                        self.state = ReadState::ValueLen {
                            command_len,
                            buf,
                            filled,
                        };
                        return DecodeStatus::InProgress;
                    }
                    Fill::Failed(e) => return DecodeStatus::Failed(e.into()),
                },

                ReadState::Command {
                    mut buf,
                    mut filled,
                    value_len,
                    skip_value,
                } => match fill(transport, &mut buf, &mut filled) {
                    Fill::Complete => {
                        let command_len = buf.len() as u32;
                        let command = Bytes::from(buf);
                        if skip_value {
                            ReadState::Discard {
                                remaining: value_len as u64,
                                command: Some(command),
                                command_len,
                                value_len,
                            }
                        } else if value_len == 0 {
                            return DecodeStatus::Done(RawFrame {
                                command,
                                value: Bytes::new(),
                            });
                        } else {
                            ReadState::Value {
                                command,
                                buf: vec![0u8; value_len as usize],
                                filled: 0,
                            }
                        }
                    }
                    Fill::Pending => {
                        self.state = ReadState::Command {
                            buf,
                            filled,
                            value_len,
                            skip_value,
                        };
                        return DecodeStatus::InProgress;
                    }
                    Fill::Failed(e) => return DecodeStatus::Failed(e.into()),
                },

                ReadState::Value {
                    command,
                    mut buf,
                    mut filled,
                } => match fill(transport, &mut buf, &mut filled) {
                    Fill::Complete => {
                        return DecodeStatus::Done(RawFrame {
                            command,
                            value: Bytes::from(buf),
                        })
                    }
                    Fill::Pending => {
                        self.state = ReadState::Value {
                            command,
                            buf,
                            filled,
                        };
                        return DecodeStatus::InProgress;
                    }
                    Fill::Failed(e) => return DecodeStatus::Failed(e.into()),
                },

                ReadState::Discard {
                    mut remaining,
                    command,
                    command_len,
                    value_len,
                } => {
                    let mut scratch = [0u8; DISCARD_CHUNK];
                    while remaining > 0 {
                        let chunk = remaining.min(DISCARD_CHUNK as u64) as usize;
                        match transport.read(&mut scratch[..chunk]) {
                            IoOutcome::Progress(0) | IoOutcome::WouldBlock => {
                                self.state = ReadState::Discard {
                                    remaining,
                                    command,
                                    command_len,
                                    value_len,
                                };
                                return DecodeStatus::InProgress;
                            }
                            IoOutcome::Progress(n) => remaining -= n as u64,
                            IoOutcome::Failed(e) => return DecodeStatus::Failed(e.into()),
                        }
                    }

                    tracing::warn!(
                        command_len,
                        value_len,
                        max = self.max_frame_size,
                        "skipped oversized frame"
                    );
                    return DecodeStatus::TooLarge {
                        command,
                        command_len,
                        value_len,
                    };
                }
            };
        }
    }

    /// Choose how to read a body once both lengths are known
    fn body_state(&self, command_len: u32, value_len: u32) -> ReadState {
        let total = command_len as u64 + value_len as u64;
        let max = self.max_frame_size as u64;

        if total <= max {
            ReadState::Command {
                buf: vec![0u8; command_len as usize],
                filled: 0,
                value_len,
                skip_value: false,
            }
        } else if (command_len as u64) <= max {
            ReadState::Command {
                buf: vec![0u8; command_len as usize],
                filled: 0,
                value_len,
                skip_value: true,
            }
        } else {
            ReadState::Discard {
                remaining: total,
                command: None,
                command_len,
                value_len,
            }
        }
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Resumable frame writer
pub struct FrameWriter {
    frame: Bytes,
    written: usize,
}

impl FrameWriter {
    pub fn new(frame: Bytes) -> Self {
        Self { frame, written: 0 }
    }

    /// Bytes still to be written
    pub fn remaining(&self) -> usize {
        self.frame.len() - self.written
    }

    /// Write as much as the transport accepts, then flush it
    pub fn write(&mut self, transport: &mut dyn Transport) -> EncodeStatus {
        while self.written < self.frame.len() {
            match transport.write(&self.frame[self.written..]) {
                IoOutcome::Progress(0) | IoOutcome::WouldBlock => return EncodeStatus::InProgress,
                IoOutcome::Progress(n) => self.written += n,
                IoOutcome::Failed(e) => return EncodeStatus::Failed(e.into()),
            }
        }

        match transport.flush() {
            IoOutcome::Progress(_) => EncodeStatus::Done,
            IoOutcome::WouldBlock => EncodeStatus::InProgress,
            IoOutcome::Failed(e) => EncodeStatus::Failed(e.into()),
        }
    }
}
