//! Configuration for Kinetic connections
//!
//! Centralized connection options with sensible defaults.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;

use crate::error::{KineticError, Result};
use crate::protocol::{Priority, DEFAULT_MAX_FRAME_SIZE};

/// Default plain TCP port of a drive
pub const DEFAULT_PORT: u16 = 8123;

/// Default TLS port of a drive
pub const DEFAULT_TLS_PORT: u16 = 8443;

/// Options for one drive connection
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    pub host: String,
    pub port: u16,

    /// Use TLS with this client configuration when set
    pub tls: Option<Arc<ClientConfig>>,

    // -------------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------------
    /// Identity the HMAC key belongs to
    pub user_id: i64,
    pub hmac_key: Vec<u8>,

    /// Sent with every command; must match the drive's
    pub cluster_version: i64,

    // -------------------------------------------------------------------------
    // Limits and timeouts
    // -------------------------------------------------------------------------
    /// Largest response frame accepted, header excluded
    pub max_frame_size: usize,

    pub connect_timeout: Duration,

    /// How long to wait for the drive's greeting
    pub handshake_timeout: Duration,

    /// How long a blocking call waits for the transport to become ready
    pub network_timeout: Duration,

    // -------------------------------------------------------------------------
    // Request defaults
    // -------------------------------------------------------------------------
    pub priority: Priority,

    /// Time the drive may spend on a request; drive default when unset
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            user_id: 1,
            hmac_key: b"asdfasdf".to_vec(),
            cluster_version: 0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
            network_timeout: Duration::from_secs(30),
            priority: Priority::Normal,
            request_timeout: None,
        }
    }
}

impl ConnectionOptions {
    /// Create a new options builder
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::default()
    }

    /// Reject options no connection could be opened with
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(KineticError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(KineticError::Config("port must not be zero".to_string()));
        }
        if self.hmac_key.is_empty() {
            return Err(KineticError::Config("HMAC key must not be empty".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(KineticError::Config(
                "maximum frame size must not be zero".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() || self.network_timeout.is_zero() {
            return Err(KineticError::Config("timeouts must not be zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for ConnectionOptions
#[derive(Default)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Connect over TLS
    pub fn tls(mut self, config: Arc<ClientConfig>) -> Self {
        self.options.tls = Some(config);
        self
    }

    /// Set the identity and the HMAC key that signs its requests
    pub fn credentials(mut self, user_id: i64, hmac_key: impl Into<Vec<u8>>) -> Self {
        self.options.user_id = user_id;
        self.options.hmac_key = hmac_key.into();
        self
    }

    pub fn cluster_version(mut self, version: i64) -> Self {
        self.options.cluster_version = version;
        self
    }

    /// Set the maximum response frame size (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.options.max_frame_size = size;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.handshake_timeout = timeout;
        self
    }

    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.options.network_timeout = timeout;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}
