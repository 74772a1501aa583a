//! Sender
//!
//! Owns the outbound queue. Requests are serialized, signed and sequenced at
//! enqueue time, then written strictly in FIFO order, one frame in flight at
//! a time. A written request's handler moves to the [`Receiver`].

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::error::KineticError;
use crate::network::Transport;
use crate::protocol::{
    check_frame_lengths, encode_command, encode_frame, AuthType, Command, EncodeStatus,
    FrameWriter, HmacAuth, Message,
};
use crate::signer::Signer;
use crate::status::{KineticStatus, StatusCode};

use super::handler::{Handler, HandlerKey};
use super::receiver::Receiver;

/// Result of a [`Sender::send`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStatus {
    /// Nothing left to write
    Idle,

    /// A frame is partially written; wait for write readiness
    IoWait,

    /// The transport failed; the sender is dead
    Error,
}

/// A fully built request waiting for its turn on the wire
struct Request {
    frame: Bytes,
    sequence: i64,
    key: HandlerKey,
    handler: Option<Box<dyn Handler>>,
}

/// The request currently being written
struct InFlight {
    writer: FrameWriter,
    sequence: i64,
    key: HandlerKey,
    handler: Option<Box<dyn Handler>>,
}

impl From<Request> for InFlight {
    fn from(request: Request) -> Self {
        Self {
            writer: FrameWriter::new(request.frame),
            sequence: request.sequence,
            key: request.key,
            handler: request.handler,
        }
    }
}

/// Outbound half of the engine
pub struct Sender {
    signer: Arc<dyn Signer>,
    identity: i64,
    hmac_key: Vec<u8>,

    queue: VecDeque<Request>,
    current: Option<InFlight>,

    /// Next sequence to assign; never reused
    sequence_number: i64,
    failed: bool,
}

impl Sender {
    pub fn new(signer: Arc<dyn Signer>, identity: i64, hmac_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signer,
            identity,
            hmac_key: hmac_key.into(),
            queue: VecDeque::new(),
            current: None,
            sequence_number: 0,
            failed: false,
        }
    }

    /// Sequence, sign and queue a request. No I/O happens here.
    ///
    /// Returns the sequence assigned to the command.
    pub fn enqueue(
        &mut self,
        message: Message,
        mut command: Command,
        value: Bytes,
        handler: Option<Box<dyn Handler>>,
        key: HandlerKey,
        connection_id: Option<i64>,
    ) -> i64 {
        let sequence = self.sequence_number;
        self.sequence_number += 1;

        command.header.connection_id = connection_id;
        command.header.sequence = Some(sequence);

        if self.failed {
            if let Some(handler) = handler {
                handler.error(
                    KineticStatus::new(StatusCode::ClientShutdown, "sender has failed"),
                    None,
                );
            }
            return sequence;
        }

        match self.build_frame(message, &command, &value) {
            Ok(frame) => {
                trace!(sequence, %key, len = frame.len(), "request queued");
                self.queue.push_back(Request {
                    frame,
                    sequence,
                    key,
                    handler,
                });
            }
            Err(e) => {
                error!(sequence, %key, error = %e, "failed to build request frame");
                if let Some(handler) = handler {
                    handler.error(
                        KineticStatus::new(
                            StatusCode::ClientInternalError,
                            format!("failed to build request frame: {}", e),
                        ),
                        None,
                    );
                }
            }
        }

        sequence
    }

    /// Serialize the command into the envelope, sign it if required, frame it
    fn build_frame(
        &self,
        mut message: Message,
        command: &Command,
        value: &[u8],
    ) -> Result<Bytes, KineticError> {
        let command_bytes = encode_command(command)?;

        if message.auth_type == AuthType::HmacAuth {
            message.hmac_auth = Some(HmacAuth {
                identity: self.identity,
                hmac: self.signer.sign(&command_bytes, &self.hmac_key),
            });
        }
        message.command_bytes = command_bytes;

        let message_bytes = message.encode()?;
        check_frame_lengths(message_bytes.len(), value.len())
            .map_err(|e| KineticError::Serialization(e.to_string()))?;
        Ok(encode_frame(&message_bytes, value))
    }

    /// Write queued frames until the queue is empty or the transport blocks
    pub fn send(&mut self, transport: &mut dyn Transport, receiver: &mut Receiver) -> SenderStatus {
        if self.failed {
            return SenderStatus::Error;
        }

        loop {
            if self.current.is_none() {
                match self.queue.pop_front() {
                    Some(request) => self.current = Some(InFlight::from(request)),
                    None => return SenderStatus::Idle,
                }
            }

            let status = match self.current.as_mut() {
                Some(in_flight) => in_flight.writer.write(transport),
                None => return SenderStatus::Idle,
            };

            match status {
                EncodeStatus::InProgress => return SenderStatus::IoWait,
                EncodeStatus::Failed(e) => {
                    warn!(error = %e, queued = self.queue.len(), "write failed, failing all queued requests");
                    self.fail_all(KineticStatus::new(
                        StatusCode::ClientIoError,
                        format!("I/O write error: {}", e),
                    ));
                    return SenderStatus::Error;
                }
                EncodeStatus::Done => {
                    let Some(done) = self.current.take() else {
                        continue;
                    };
                    trace!(sequence = done.sequence, key = %done.key, "request written");

                    // Fire-and-forget requests expect no response
                    let Some(handler) = done.handler else {
                        continue;
                    };
                    if let Err(handler) = receiver.enqueue(handler, done.sequence, done.key) {
                        error!(
                            sequence = done.sequence,
                            key = %done.key,
                            "receiver rejected handler for duplicate sequence or key"
                        );
                        handler.error(
                            KineticStatus::new(
                                StatusCode::ClientInternalError,
                                "could not track response for request",
                            ),
                            None,
                        );
                    }
                }
            }
        }
    }

    /// Cancel a request that has not started writing yet.
    ///
    /// No callback fires.
    pub fn remove(&mut self, key: HandlerKey) -> bool {
        match self.queue.iter().position(|request| request.key == key) {
            Some(index) => {
                self.queue.remove(index);
                debug!(%key, "removed queued request");
                true
            }
            None => false,
        }
    }

    /// Fail the in-flight request and everything queued, then mark dead
    fn fail_all(&mut self, status: KineticStatus) {
        self.failed = true;

        let in_flight = self.current.take().and_then(|in_flight| in_flight.handler);
        let queued = self.queue.drain(..).filter_map(|request| request.handler);

        for handler in in_flight.into_iter().chain(queued) {
            handler.error(status.clone(), None);
        }
    }

    /// Number of requests not yet fully written, the in-flight one included
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Sequence the next enqueued request will get
    pub fn next_sequence(&self) -> i64 {
        self.sequence_number
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        if self.pending() > 0 {
            debug!(pending = self.pending(), "sender dropped with pending requests");
        }
        self.fail_all(KineticStatus::new(
            StatusCode::ClientShutdown,
            "connection shut down",
        ));
    }
}
