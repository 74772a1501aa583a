//! Multiplexing Service
//!
//! Composes one transport, one [`Sender`] and one [`Receiver`] into a single
//! request/response multiplexer. The service never blocks and owns no
//! thread: the caller drives it by calling [`run`](MultiplexingService::run)
//! whenever the transport is ready, and waits on the returned interest.
//!
//! Once the sender or the receiver fails, the service trips a one-way fuse
//! and refuses all further work.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use mio::event::Source;
use mio::{Registry, Token};
use tracing::{debug, error};

use crate::config::ConnectionOptions;
use crate::error::Result;
use crate::network::{Readiness, Transport};
use crate::protocol::{Command, Message};
use crate::signer::Signer;
use crate::status::{KineticStatus, StatusCode};

use super::handler::{Handler, HandlerKey};
use super::receiver::{Receiver, ReceiverStatus};
use super::sender::{Sender, SenderStatus};

/// Pipelined request multiplexer over one connection
pub struct MultiplexingService {
    // Declared first so queued handlers fail before the transport closes
    sender: Sender,
    receiver: Receiver,
    transport: Box<dyn Transport>,

    /// Next handler key to hand out
    next_key: u64,

    /// Fuse; never reset once set
    failed: bool,
}

impl MultiplexingService {
    /// Take ownership of a connected transport and perform the handshake
    pub fn new(
        mut transport: Box<dyn Transport>,
        signer: Arc<dyn Signer>,
        options: &ConnectionOptions,
    ) -> Result<Self> {
        let receiver = Receiver::new(
            transport.as_mut(),
            Arc::clone(&signer),
            options.hmac_key.clone(),
            options.max_frame_size,
            options.handshake_timeout,
        )?;
        let sender = Sender::new(signer, options.user_id, options.hmac_key.clone());

        debug!(connection_id = ?receiver.connection_id(), "service ready");

        Ok(Self {
            sender,
            receiver,
            transport,
            next_key: 0,
            failed: false,
        })
    }

    /// Queue a request. No I/O happens until the next [`run`](Self::run).
    ///
    /// A request without a handler expects no response. On a failed service
    /// the handler fails immediately with `ClientShutdown`; a key is still
    /// returned.
    pub fn submit(
        &mut self,
        message: Message,
        command: Command,
        value: Bytes,
        handler: Option<Box<dyn Handler>>,
    ) -> HandlerKey {
        let key = HandlerKey(self.next_key);
        self.next_key += 1;

        if self.failed {
            if let Some(handler) = handler {
                handler.error(
                    KineticStatus::new(StatusCode::ClientShutdown, "connection has failed"),
                    None,
                );
            }
            return key;
        }

        self.sender.enqueue(
            message,
            command,
            value,
            handler,
            key,
            self.receiver.connection_id(),
        );
        key
    }

    /// Make as much progress as the transport allows without blocking.
    ///
    /// Returns the interest to wait on before the next call, or `None` once
    /// the connection is dead.
    pub fn run(&mut self) -> Option<Readiness> {
        if self.failed {
            return None;
        }

        let sent = self.sender.send(self.transport.as_mut(), &mut self.receiver);
        if sent == SenderStatus::Error {
            error!(outstanding = self.receiver.outstanding(), "connection failed while sending");
            self.failed = true;
            return None;
        }

        let received = self.receiver.receive(self.transport.as_mut());
        if received == ReceiverStatus::Error {
            error!(outstanding = self.receiver.outstanding(), "connection failed while receiving");
            self.failed = true;
            return None;
        }

        Some(Readiness {
            read: received == ReceiverStatus::IoWait,
            write: sent == SenderStatus::IoWait,
        })
    }

    /// Cancel a request, wherever it is. No callback fires.
    ///
    /// A request already written is still executed by the drive; only its
    /// response is dropped.
    pub fn remove(&mut self, key: HandlerKey) -> bool {
        self.sender.remove(key) || self.receiver.remove(key)
    }

    // =========================================================================
    // Readiness integration
    // =========================================================================

    /// The transport's pollable handle
    pub fn source(&mut self) -> Option<&mut dyn Source> {
        self.transport.source()
    }

    /// Register the transport with a caller-owned poll
    pub fn register(&mut self, registry: &Registry, token: Token, readiness: Readiness) -> io::Result<()> {
        match (self.transport.source(), readiness.interest()) {
            (Some(source), Some(interest)) => registry.register(source, token, interest),
            _ => Ok(()),
        }
    }

    /// Update the interest after a [`run`](Self::run)
    pub fn reregister(&mut self, registry: &Registry, token: Token, readiness: Readiness) -> io::Result<()> {
        match (self.transport.source(), readiness.interest()) {
            (Some(source), Some(interest)) => registry.reregister(source, token, interest),
            _ => Ok(()),
        }
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self.transport.source() {
            Some(source) => registry.deregister(source),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn connection_id(&self) -> Option<i64> {
        self.receiver.connection_id()
    }

    /// The unsolicited status the drive sent when the connection opened
    pub fn handshake_response(&self) -> &Command {
        self.receiver.handshake_response()
    }

    pub fn is_alive(&self) -> bool {
        !self.failed
    }

    /// Requests not yet fully written
    pub fn pending_writes(&self) -> usize {
        self.sender.pending()
    }

    /// Requests written and waiting on a response
    pub fn outstanding(&self) -> usize {
        self.receiver.outstanding()
    }
}
