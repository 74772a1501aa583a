//! Shared test helpers
//!
//! A scripted in-memory transport standing in for a drive, plus builders for
//! the frames a drive sends.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use kinetic::engine::Handler;
use kinetic::network::{IoOutcome, Transport};
use kinetic::protocol::{
    encode_command, encode_frame, AuthType, Body, Command, Header, HmacAuth, Message, MessageType,
    Status, WireStatusCode, HEADER_SIZE,
};
use kinetic::signer::{HmacSha1Signer, Signer};
use kinetic::{ConnectionOptions, KineticStatus};
use parking_lot::Mutex;

pub const USER_ID: i64 = 1;
pub const HMAC_KEY: &[u8] = b"asdfasdf";
pub const CONNECTION_ID: i64 = 4242;

/// Options tuned for in-memory tests
pub fn options() -> ConnectionOptions {
    ConnectionOptions::builder()
        .credentials(USER_ID, HMAC_KEY)
        .handshake_timeout(Duration::from_millis(500))
        .network_timeout(Duration::from_millis(300))
        .build()
}

// =============================================================================
// Drive-side frames
// =============================================================================

fn success() -> Option<Status> {
    Some(Status::new(WireStatusCode::Success))
}

/// The unsolicited status a drive greets a new connection with
pub fn handshake_frame(connection_id: i64) -> Bytes {
    let command = Command {
        header: Header {
            connection_id: Some(connection_id),
            cluster_version: Some(0),
            ..Header::default()
        },
        body: Body::Empty,
        status: success(),
    };
    let mut message = Message::unsolicited();
    message.command_bytes = encode_command(&command).unwrap();
    encode_frame(&message.encode().unwrap(), &[])
}

/// A response command acknowledging `ack_sequence`
pub fn response(ack_sequence: i64, code: WireStatusCode, body: Body) -> Command {
    Command {
        header: Header {
            ack_sequence: Some(ack_sequence),
            message_type: Some(MessageType::NoOpResponse),
            ..Header::default()
        },
        body,
        status: Some(Status::new(code)),
    }
}

/// Sign `command` with `key` and frame it
pub fn signed_frame_with_key(command: &Command, value: &[u8], key: &[u8]) -> Bytes {
    let command_bytes = encode_command(command).unwrap();
    let message = Message {
        auth_type: AuthType::HmacAuth,
        hmac_auth: Some(HmacAuth {
            identity: USER_ID,
            hmac: HmacSha1Signer.sign(&command_bytes, key),
        }),
        pin_auth: None,
        command_bytes,
    };
    encode_frame(&message.encode().unwrap(), value)
}

pub fn signed_frame(command: &Command, value: &[u8]) -> Bytes {
    signed_frame_with_key(command, value, HMAC_KEY)
}

/// A correctly signed success response with an empty body
pub fn ok_frame(ack_sequence: i64) -> Bytes {
    signed_frame(&response(ack_sequence, WireStatusCode::Success, Body::Empty), &[])
}

/// A correctly signed response carrying `code`
pub fn status_frame(ack_sequence: i64, code: WireStatusCode) -> Bytes {
    signed_frame(&response(ack_sequence, code, Body::Empty), &[])
}

// =============================================================================
// Scripted transport
// =============================================================================

/// A request as the drive received it
#[derive(Debug, Clone)]
pub struct Request {
    pub message: Message,
    pub command: Command,
    pub value: Bytes,
}

impl Request {
    pub fn sequence(&self) -> i64 {
        self.command.header.sequence.unwrap()
    }
}

/// Builds the drive's reply to one request; `None` leaves it unanswered
pub type Responder = Box<dyn FnMut(&Request) -> Option<Bytes> + Send>;

#[derive(Default)]
pub struct MockState {
    /// Bytes the drive has sent and the client has not read yet
    pub inbound: VecDeque<u8>,

    /// Everything the client wrote
    pub written: Vec<u8>,
    parsed: usize,
    pub requests: Vec<Request>,

    /// Largest read served at once
    pub read_chunk: Option<usize>,

    /// Bytes accepted before writes block
    pub write_budget: Option<usize>,

    pub fail_reads: bool,
    pub fail_writes: bool,

    /// Report end of stream once `inbound` is drained
    pub eof: bool,

    /// Hang up once a request arrives; the first read after it still blocks
    pub hang_up_on_request: bool,
    hang_up_armed: bool,

    responder: Option<Responder>,
}

impl MockState {
    /// Split newly written bytes into requests and let the responder answer
    fn parse_written(&mut self) {
        loop {
            let pending = &self.written[self.parsed..];
            if pending.len() < HEADER_SIZE {
                return;
            }
            let command_len = u32::from_be_bytes(pending[1..5].try_into().unwrap()) as usize;
            let value_len = u32::from_be_bytes(pending[5..9].try_into().unwrap()) as usize;
            let total = HEADER_SIZE + command_len + value_len;
            if pending.len() < total {
                return;
            }

            let decoded = Message::decode(&pending[HEADER_SIZE..HEADER_SIZE + command_len])
                .ok()
                .and_then(|message| message.command().ok().map(|command| (message, command)));
            let value = Bytes::copy_from_slice(&pending[HEADER_SIZE + command_len..total]);
            self.parsed += total;

            // Raw frames written by codec tests carry no message
            let Some((message, command)) = decoded else {
                continue;
            };

            let request = Request {
                message,
                command,
                value,
            };
            if let Some(mut responder) = self.responder.take() {
                if let Some(reply) = responder(&request) {
                    self.inbound.extend(reply.iter().copied());
                }
                self.responder = Some(responder);
            }
            self.requests.push(request);
            if self.hang_up_on_request {
                self.hang_up_armed = true;
            }
        }
    }
}

/// In-memory transport; clones share the same state
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose drive has already sent its greeting
    pub fn with_handshake() -> Self {
        let transport = Self::new();
        transport.push(&handshake_frame(CONNECTION_ID));
        transport
    }

    /// Queue bytes from the drive
    pub fn push(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    pub fn set_responder(&self, responder: impl FnMut(&Request) -> Option<Bytes> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Answer every request with an empty success
    pub fn respond_ok(&self) {
        self.set_responder(|request| Some(ok_frame(request.sequence())));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn written_len(&self) -> usize {
        self.state.lock().written.len()
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    pub fn set_read_chunk(&self, chunk: usize) {
        self.state.lock().read_chunk = Some(chunk);
    }

    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.state.lock().write_budget = budget;
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    pub fn close(&self) {
        self.state.lock().eof = true;
    }

    pub fn hang_up_on_request(&self) {
        self.state.lock().hang_up_on_request = true;
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome {
        let mut state = self.state.lock();

        if state.inbound.is_empty() {
            if state.hang_up_armed {
                state.hang_up_armed = false;
                state.eof = true;
                return IoOutcome::WouldBlock;
            }
            if state.fail_reads {
                return IoOutcome::Failed(io::Error::new(ErrorKind::ConnectionReset, "reset by drive"));
            }
            if state.eof {
                return IoOutcome::Failed(io::Error::new(ErrorKind::UnexpectedEof, "closed by drive"));
            }
            return IoOutcome::WouldBlock;
        }

        let limit = state.read_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        IoOutcome::Progress(n)
    }

    fn write(&mut self, buf: &[u8]) -> IoOutcome {
        let mut state = self.state.lock();

        if state.fail_writes {
            return IoOutcome::Failed(io::Error::new(ErrorKind::BrokenPipe, "drive went away"));
        }

        let budget = state.write_budget;
        let n = match budget {
            Some(0) => return IoOutcome::WouldBlock,
            Some(budget) => {
                let n = budget.min(buf.len());
                state.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };

        state.written.extend_from_slice(&buf[..n]);
        state.parse_written();
        IoOutcome::Progress(n)
    }
}

// =============================================================================
// Recording handler
// =============================================================================

#[derive(Debug, Clone)]
pub enum Outcome {
    Handled { command: Command, value: Bytes },
    Failed(KineticStatus),
}

impl Outcome {
    pub fn status(&self) -> Option<&KineticStatus> {
        match self {
            Outcome::Failed(status) => Some(status),
            Outcome::Handled { .. } => None,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Outcome::Handled { .. })
    }
}

/// Collects handler outcomes tagged with the handler's label
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<(u32, Outcome)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, label: u32) -> Box<dyn Handler> {
        Box::new(RecordingHandler {
            label,
            log: Arc::clone(&self.log),
        })
    }

    pub fn outcomes(&self) -> Vec<(u32, Outcome)> {
        self.log.lock().clone()
    }

    pub fn outcome(&self, label: u32) -> Option<Outcome> {
        self.log
            .lock()
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, outcome)| outcome.clone())
    }

    pub fn labels(&self) -> Vec<u32> {
        self.log.lock().iter().map(|(label, _)| *label).collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }
}

struct RecordingHandler {
    label: u32,
    log: Arc<Mutex<Vec<(u32, Outcome)>>>,
}

impl Handler for RecordingHandler {
    fn handle(self: Box<Self>, response: &Command, value: Bytes) {
        self.log.lock().push((
            self.label,
            Outcome::Handled {
                command: response.clone(),
                value,
            },
        ));
    }

    fn error(self: Box<Self>, status: KineticStatus, _response: Option<&Command>) {
        self.log.lock().push((self.label, Outcome::Failed(status)));
    }
}
