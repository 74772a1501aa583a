//! TLS transport
//!
//! Wraps the plain TCP transport with a rustls client session. The TLS
//! handshake is driven implicitly by the first reads and writes.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use mio::event::Source;
use mio::net::TcpStream;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::error::{KineticError, Result};
use super::transport::{IoOutcome, TcpTransport, Transport};

static CRYPTO_INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide rustls crypto provider once.
///
/// Safe to call from any thread, any number of times. If the host
/// application already installed a provider, that one is kept.
pub fn init_crypto() {
    CRYPTO_INIT.get_or_init(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

/// Build a client config trusting the certificates in a PEM file
pub fn client_config_from_pem(path: impl AsRef<Path>) -> Result<Arc<ClientConfig>> {
    init_crypto();

    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        KineticError::Tls(format!(
            "failed to open certificate file {}: {}",
            path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(std::result::Result::ok)
        .collect();

    if certs.is_empty() {
        return Err(KineticError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert)?;
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// TLS transport over a non-blocking mio socket
pub struct TlsTransport {
    stream: TcpStream,
    tls: ClientConnection,
}

impl TlsTransport {
    /// Connect to `host:port` and start a TLS session with `config`
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        config: Arc<ClientConfig>,
    ) -> Result<Self> {
        init_crypto();

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| KineticError::Tls(format!("invalid server name {}: {}", host, e)))?;
        let tls = ClientConnection::new(config, server_name)?;
        let tcp = TcpTransport::connect(host, port, timeout)?;

        Ok(Self {
            stream: tcp.into_stream(),
            tls,
        })
    }

    /// Write queued TLS records to the socket
    fn flush_records(&mut self) -> IoOutcome {
        let mut written = 0;
        while self.tls.wants_write() {
            match self.tls.write_tls(&mut self.stream) {
                Ok(n) => written += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return IoOutcome::WouldBlock,
                Err(e) => return IoOutcome::Failed(e),
            }
        }
        IoOutcome::Progress(written)
    }
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome {
        loop {
            // Plaintext already decrypted takes priority over the socket
            match self.tls.reader().read(buf) {
                Ok(0) if !buf.is_empty() => {
                    return IoOutcome::Failed(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "TLS session closed by peer",
                    ))
                }
                Ok(n) => return IoOutcome::Progress(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return IoOutcome::Failed(e),
            }

            if let IoOutcome::Failed(e) = self.flush_records() {
                return IoOutcome::Failed(e);
            }

            match self.tls.read_tls(&mut self.stream) {
                Ok(0) => {
                    return IoOutcome::Failed(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed during TLS session",
                    ))
                }
                Ok(_) => {
                    if let Err(e) = self.tls.process_new_packets() {
                        // Best effort: let the peer see our alert
                        let _ = self.flush_records();
                        return IoOutcome::Failed(io::Error::new(ErrorKind::InvalidData, e));
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return IoOutcome::WouldBlock,
                Err(e) => return IoOutcome::Failed(e),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> IoOutcome {
        // Accept no new plaintext until earlier records are on the wire
        match self.flush_records() {
            IoOutcome::Progress(_) => {}
            other => return other,
        }

        let accepted = match self.tls.writer().write(buf) {
            Ok(0) if !buf.is_empty() => return IoOutcome::WouldBlock,
            Ok(n) => n,
            Err(e) => return IoOutcome::Failed(e),
        };

        match self.flush_records() {
            IoOutcome::Failed(e) => IoOutcome::Failed(e),
            _ => IoOutcome::Progress(accepted),
        }
    }

    fn flush(&mut self) -> IoOutcome {
        self.flush_records()
    }

    fn source(&mut self) -> Option<&mut dyn Source> {
        Some(&mut self.stream)
    }
}
