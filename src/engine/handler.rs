//! Response handlers
//!
//! A handler is bound to exactly one outstanding request. Both entry points
//! consume the boxed handler, so it can fire at most once.

use std::fmt;

use bytes::Bytes;

use crate::protocol::Command;
use crate::status::KineticStatus;

/// Client-side handle for an outstanding request, used to cancel it.
///
/// Unrelated to the wire sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey(pub u64);

impl HandlerKey {
    /// Reserved for the handshake pseudo-handler; never handed out by a service
    pub const HANDSHAKE: HandlerKey = HandlerKey(u64::MAX);
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single-use response callback
pub trait Handler: Send {
    /// The drive answered with a success status
    fn handle(self: Box<Self>, response: &Command, value: Bytes);

    /// The request failed, remotely or locally. `response` is present when
    /// the drive answered.
    fn error(self: Box<Self>, status: KineticStatus, response: Option<&Command>);
}

/// Caller callback receiving the typed outcome of a request
pub type Callback<T> = Box<dyn FnOnce(Result<T, KineticStatus>) + Send>;

/// Turns a successful response into a typed result
pub type Decoder<T> = fn(&Command, Bytes) -> Result<T, KineticStatus>;

/// Handler parameterized over a response decoder
pub struct CallbackHandler<T> {
    decode: Decoder<T>,
    callback: Callback<T>,
}

impl<T> CallbackHandler<T> {
    pub fn new(decode: Decoder<T>, callback: Callback<T>) -> Self {
        Self { decode, callback }
    }
}

impl<T> Handler for CallbackHandler<T> {
    fn handle(self: Box<Self>, response: &Command, value: Bytes) {
        let result = (self.decode)(response, value);
        (self.callback)(result);
    }

    fn error(self: Box<Self>, status: KineticStatus, _response: Option<&Command>) {
        (self.callback)(Err(status));
    }
}
