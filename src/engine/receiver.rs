//! Receiver
//!
//! Owns the outstanding handlers, reads response frames, verifies their
//! digests and dispatches each one to the handler waiting on its
//! `ack_sequence`. Responses may arrive in any order.
//!
//! ## Failure policy
//! - Framing or transport failure: fatal. Every handler fails with an I/O
//!   read error and the receiver stays dead.
//! - Digest mismatch, missing ack sequence, undecodable message: every
//!   outstanding handler fails, the connection stays usable.
//! - Oversized frame: the matching handler (or, if none can be identified,
//!   every handler) fails with `ClientResponseTooLarge`.
//! - Unknown ack sequence: skipped silently; the request was cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::{KineticError, Result};
use crate::network::{Readiness, Transport, Waiter};
use crate::protocol::{AuthType, Command, DecodeStatus, FrameReader, Message, RawFrame};
use crate::signer::Signer;
use crate::status::{KineticStatus, StatusCode};

use super::handler::{Handler, HandlerKey};
use super::handler_map::HandlerMap;

/// Sequence the drive's unsolicited status frames are treated as answering
pub const HANDSHAKE_SEQUENCE: i64 = -1;

/// Result of a [`Receiver::receive`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverStatus {
    /// Nothing outstanding, or a non-fatal error cleared all handlers
    Idle,

    /// Waiting on more bytes; wait for read readiness
    IoWait,

    /// The transport or framing failed; the receiver is dead
    Error,
}

type HandshakeOutcome = Arc<Mutex<Option<std::result::Result<Command, KineticStatus>>>>;

/// Pseudo-handler registered for the drive's greeting
struct HandshakeHandler {
    outcome: HandshakeOutcome,
}

impl Handler for HandshakeHandler {
    fn handle(self: Box<Self>, response: &Command, _value: Bytes) {
        *self.outcome.lock() = Some(Ok(response.clone()));
    }

    fn error(self: Box<Self>, status: KineticStatus, _response: Option<&Command>) {
        *self.outcome.lock() = Some(Err(status));
    }
}

/// Inbound half of the engine
pub struct Receiver {
    signer: Arc<dyn Signer>,
    hmac_key: Vec<u8>,

    handlers: HandlerMap,
    reader: FrameReader,

    /// Learned from the handshake, refreshed from any response carrying one
    connection_id: Option<i64>,

    /// The drive's greeting
    handshake: Command,
    failed: bool,
}

impl Receiver {
    /// Create a receiver and perform the handshake.
    ///
    /// Blocks until the drive's unsolicited status arrives or
    /// `handshake_timeout` elapses; no receiver is produced on failure.
    pub fn new(
        transport: &mut dyn Transport,
        signer: Arc<dyn Signer>,
        hmac_key: impl Into<Vec<u8>>,
        max_frame_size: usize,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let mut receiver = Self {
            signer,
            hmac_key: hmac_key.into(),
            handlers: HandlerMap::new(),
            reader: FrameReader::new(max_frame_size),
            connection_id: None,
            handshake: Command::default(),
            failed: false,
        };

        receiver.handshake(transport, handshake_timeout)?;
        Ok(receiver)
    }

    fn handshake(&mut self, transport: &mut dyn Transport, timeout: Duration) -> Result<()> {
        debug!(?timeout, "waiting for drive handshake");

        let outcome: HandshakeOutcome = Arc::new(Mutex::new(None));
        let handler = Box::new(HandshakeHandler {
            outcome: Arc::clone(&outcome),
        });
        if self
            .handlers
            .insert(HANDSHAKE_SEQUENCE, HandlerKey::HANDSHAKE, handler)
            .is_err()
        {
            return Err(KineticError::Handshake(KineticStatus::new(
                StatusCode::ClientInternalError,
                "handshake handler already registered",
            )));
        }

        let mut waiter = Waiter::new()?;
        let result = self.await_handshake(transport, &mut waiter, &outcome, timeout);
        waiter.release(transport.source());

        match result {
            Ok(greeting) => {
                info!(connection_id = ?self.connection_id, "handshake complete");
                self.handshake = greeting;
                Ok(())
            }
            Err(e) => {
                self.handlers.remove_by_key(HandlerKey::HANDSHAKE);
                warn!(error = %e, "handshake failed");
                Err(e)
            }
        }
    }

    fn await_handshake(
        &mut self,
        transport: &mut dyn Transport,
        waiter: &mut Waiter,
        outcome: &HandshakeOutcome,
        timeout: Duration,
    ) -> Result<Command> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.receive(transport);

            if let Some(result) = outcome.lock().take() {
                return result.map_err(KineticError::Handshake);
            }
            if status == ReceiverStatus::Error {
                return Err(KineticError::Handshake(KineticStatus::new(
                    StatusCode::ClientIoError,
                    "connection failed during handshake",
                )));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(KineticError::Handshake(KineticStatus::new(
                    StatusCode::ClientNetworkTimeout,
                    format!("no handshake from drive within {:?}", timeout),
                )));
            }
            waiter.wait(transport.source(), Readiness::read(), deadline - now)?;
        }
    }

    /// Track a handler for the response to `sequence`.
    ///
    /// Rejects duplicates without changing anything and hands the handler
    /// back.
    pub fn enqueue(
        &mut self,
        handler: Box<dyn Handler>,
        sequence: i64,
        key: HandlerKey,
    ) -> std::result::Result<(), Box<dyn Handler>> {
        self.handlers.insert(sequence, key, handler).map_err(|handler| {
            error!(sequence, %key, "duplicate sequence or handler key");
            handler
        })
    }

    /// Read and dispatch every response the transport has buffered
    pub fn receive(&mut self, transport: &mut dyn Transport) -> ReceiverStatus {
        if self.failed {
            return ReceiverStatus::Error;
        }

        loop {
            if !self.reader.in_progress() && self.handlers.is_empty() {
                return ReceiverStatus::Idle;
            }

            match self.reader.read(transport) {
                DecodeStatus::InProgress => return ReceiverStatus::IoWait,
                DecodeStatus::Failed(e) => {
                    warn!(error = %e, outstanding = self.handlers.len(), "read failed, failing all outstanding requests");
                    self.failed = true;
                    self.fail_all(KineticStatus::new(
                        StatusCode::ClientIoError,
                        format!("I/O read error: {}", e),
                    ));
                    return ReceiverStatus::Error;
                }
                DecodeStatus::TooLarge { command, .. } => self.dispatch_too_large(command),
                DecodeStatus::Done(frame) => {
                    if let Some(status) = self.dispatch(frame) {
                        return status;
                    }
                }
            }
        }
    }

    /// Route one complete frame. Returns a status when `receive` must stop.
    fn dispatch(&mut self, frame: RawFrame) -> Option<ReceiverStatus> {
        let message = match Message::decode(&frame.command) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "undecodable response message");
                self.fail_all(KineticStatus::new(
                    StatusCode::ClientIoError,
                    format!("malformed response: {}", e),
                ));
                return Some(ReceiverStatus::Idle);
            }
        };

        if message.auth_type == AuthType::HmacAuth
            && !self.signer.verify(&message, &self.hmac_key)
        {
            warn!(outstanding = self.handlers.len(), "response failed HMAC verification");
            self.fail_all(KineticStatus::new(
                StatusCode::ClientResponseHmacVerificationError,
                "response HMAC did not verify",
            ));
            return Some(ReceiverStatus::Idle);
        }

        let command = match message.command() {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "undecodable response command");
                self.fail_all(KineticStatus::new(
                    StatusCode::ClientIoError,
                    format!("malformed response: {}", e),
                ));
                return Some(ReceiverStatus::Idle);
            }
        };

        if let Some(connection_id) = command.header.connection_id {
            self.connection_id = Some(connection_id);
        }

        let ack_sequence = if message.auth_type == AuthType::UnsolicitedStatus {
            HANDSHAKE_SEQUENCE
        } else {
            match command.header.ack_sequence {
                Some(ack_sequence) => ack_sequence,
                None => {
                    warn!("response carried no ack sequence");
                    self.fail_all(KineticStatus::new(
                        StatusCode::ProtocolErrorResponseNoAckSequence,
                        "response had no ack sequence",
                    ));
                    return Some(ReceiverStatus::Idle);
                }
            }
        };

        let Some((handler, key)) = self.handlers.remove_by_sequence(ack_sequence) else {
            debug!(ack_sequence, "no handler for response, skipping");
            return None;
        };

        trace!(ack_sequence, %key, "dispatching response");
        if command.is_success() {
            handler.handle(&command, frame.value);
        } else {
            handler.error(KineticStatus::from_response(&command), Some(&command));
        }
        None
    }

    /// Fail whoever the oversized frame answered, or everyone if unknown
    fn dispatch_too_large(&mut self, command: Option<Bytes>) {
        let status = KineticStatus::new(
            StatusCode::ClientResponseTooLarge,
            "response exceeded the maximum frame size",
        );

        let ack_sequence = command
            .and_then(|bytes| Message::decode(&bytes).ok())
            .filter(|message| {
                message.auth_type != AuthType::HmacAuth
                    || self.signer.verify(message, &self.hmac_key)
            })
            .and_then(|message| message.command().ok())
            .and_then(|command| command.header.ack_sequence);

        match ack_sequence {
            Some(ack_sequence) => {
                if let Some((handler, _)) = self.handlers.remove_by_sequence(ack_sequence) {
                    handler.error(status, None);
                }
            }
            None => self.fail_all(status),
        }
    }

    /// Cancel an outstanding handler. No callback fires.
    pub fn remove(&mut self, key: HandlerKey) -> bool {
        match self.handlers.remove_by_key(key) {
            Some((_, sequence)) => {
                debug!(%key, sequence, "removed outstanding request");
                true
            }
            None => false,
        }
    }

    fn fail_all(&mut self, status: KineticStatus) {
        for handler in self.handlers.drain() {
            handler.error(status.clone(), None);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn connection_id(&self) -> Option<i64> {
        self.connection_id
    }

    /// The unsolicited status the drive greeted us with
    pub fn handshake_response(&self) -> &Command {
        &self.handshake
    }

    /// Number of handlers waiting on a response
    pub fn outstanding(&self) -> usize {
        self.handlers.len()
    }

    pub fn contains_key(&self, key: HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn contains_sequence(&self, sequence: i64) -> bool {
        self.handlers.contains_sequence(sequence)
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.fail_all(KineticStatus::new(
            StatusCode::ClientShutdown,
            "connection shut down",
        ));
    }
}
