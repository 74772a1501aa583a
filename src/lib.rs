//! # Kinetic
//!
//! Client for Kinetic key-value drives with:
//! - Pipelined requests over a single connection
//! - HMAC-signed commands and verified responses
//! - Out-of-order response correlation by sequence number
//! - Readiness-driven, non-blocking I/O with no threads of its own
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Blocking / Synchronized / Batch facades               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Non-blocking Connection                       │
//! │          (request builders, response decoders)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Multiplexing Service                         │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │     Sender      │                │    Receiver     │
//!   │ (FIFO, signing) │───handlers────►│ (verify, match) │
//!   └────────┬────────┘                └────────┬────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │          Frame codec over TCP / TLS transport        │
//!   └─────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod status;
pub mod record;
pub mod signer;

pub mod network;
pub mod protocol;
pub mod engine;
pub mod connection;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KineticError, Result};
pub use config::{ConnectionOptions, ConnectionOptionsBuilder};
pub use status::{KineticStatus, StatusCode};
pub use record::KineticRecord;
pub use engine::HandlerKey;
pub use connection::{
    BatchId, BatchOperation, BlockingConnection, NonblockingConnection, PersistMode, Synchronized,
    ThreadsafeBlockingConnection, ThreadsafeNonblockingConnection, WriteMode,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
