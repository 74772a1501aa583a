//! Network Module
//!
//! Byte transports and the readiness primitive.
//!
//! ## Architecture
//! - Transports are non-blocking and never own a thread
//! - Plain TCP and TLS share one trait
//! - Callers block, if at all, through a [`Waiter`]

mod transport;
mod tls;
mod readiness;

pub use transport::{IoOutcome, TcpTransport, Transport};
pub use tls::{client_config_from_pem, init_crypto, TlsTransport};
pub use readiness::{Readiness, Waiter};
