//! Error types for the Kinetic client
//!
//! `KineticError` covers failures that prevent a connection from being
//! produced at all. Failures of individual requests are reported as
//! [`KineticStatus`](crate::status::KineticStatus) values instead.

use thiserror::Error;

use crate::status::KineticStatus;

/// Result type alias using KineticError
pub type Result<T> = std::result::Result<T, KineticError>;

/// Unified error type for connection setup
#[derive(Debug, Error)]
pub enum KineticError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // TLS Errors
    // -------------------------------------------------------------------------
    #[error("TLS error: {0}")]
    Tls(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Handshake failed: {0}")]
    Handshake(KineticStatus),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for KineticError {
    fn from(e: bincode::Error) -> Self {
        KineticError::Serialization(e.to_string())
    }
}

impl From<rustls::Error> for KineticError {
    fn from(e: rustls::Error) -> Self {
        KineticError::Tls(e.to_string())
    }
}
