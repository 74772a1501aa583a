//! Byte Transport
//!
//! Non-blocking byte channel the engine reads frames from and writes frames
//! to. Every call reports one of three outcomes: progress was made, the call
//! would block, or the channel failed.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::Duration;

use mio::event::Source;
use mio::net::TcpStream;

/// Outcome of a single transport call
#[derive(Debug)]
pub enum IoOutcome {
    /// This many bytes were transferred
    Progress(usize),

    /// Nothing could be transferred without blocking
    WouldBlock,

    /// The channel is unusable
    Failed(io::Error),
}

/// A readable/writable non-blocking byte channel
pub trait Transport: Send {
    /// Read into `buf`. End of stream is reported as `Failed`.
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome;

    /// Write from `buf`
    fn write(&mut self, buf: &[u8]) -> IoOutcome;

    /// Push out anything the transport buffered internally
    fn flush(&mut self) -> IoOutcome {
        IoOutcome::Progress(0)
    }

    /// The pollable handle behind this transport, used with an external
    /// readiness primitive. In-memory transports have none.
    fn source(&mut self) -> Option<&mut dyn Source> {
        None
    }
}

/// Plain TCP transport over a non-blocking mio socket
pub struct TcpTransport {
    stream: TcpStream,

    /// Peer address for logging
    peer_addr: String,
}

impl TcpTransport {
    /// Connect to `host:port` (blocking, bounded by `timeout`), then switch the
    /// socket to non-blocking mode
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let stream = connect_std(host, port, timeout)?;
        Self::from_std(stream)
    }

    /// Wrap an already connected socket
    pub fn from_std(stream: StdTcpStream) -> io::Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        Ok(Self {
            stream: TcpStream::from_std(stream),
            peer_addr,
        })
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub(crate) fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome {
        loop {
            return match self.stream.read(buf) {
                Ok(0) if !buf.is_empty() => IoOutcome::Failed(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("connection to {} closed by peer", self.peer_addr),
                )),
                Ok(n) => IoOutcome::Progress(n),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => IoOutcome::WouldBlock,
                Err(e) => IoOutcome::Failed(e),
            };
        }
    }

    fn write(&mut self, buf: &[u8]) -> IoOutcome {
        loop {
            return match self.stream.write(buf) {
                Ok(0) if !buf.is_empty() => IoOutcome::Failed(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("failed to write to {}", self.peer_addr),
                )),
                Ok(n) => IoOutcome::Progress(n),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => IoOutcome::WouldBlock,
                Err(e) => IoOutcome::Failed(e),
            };
        }
    }

    fn source(&mut self) -> Option<&mut dyn Source> {
        Some(&mut self.stream)
    }
}

/// Resolve and connect, trying each resolved address in turn
pub(crate) fn connect_std(host: &str, port: u16, timeout: Duration) -> io::Result<StdTcpStream> {
    let mut last_error = None;

    for addr in (host, port).to_socket_addrs()? {
        match StdTcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("{}:{} did not resolve to any address", host, port),
        )
    }))
}
