//! Engine Module
//!
//! The non-blocking protocol engine: the outbound [`Sender`], the inbound
//! [`Receiver`], and the [`MultiplexingService`] that drives both over one
//! transport.
//!
//! ## Lifecycle of a request
//! ```text
//! submit ──► Sender queue ──► written ──► Receiver map ──► response ──► handler
//!                 │                            │
//!                 └──── remove(key) ───────────┘  (silent cancel)
//! ```

mod handler;
mod handler_map;
mod sender;
mod receiver;
mod service;

pub use handler::{Callback, CallbackHandler, Decoder, Handler, HandlerKey};
pub use handler_map::HandlerMap;
pub use sender::{Sender, SenderStatus};
pub use receiver::{Receiver, ReceiverStatus, HANDSHAKE_SEQUENCE};
pub use service::MultiplexingService;
