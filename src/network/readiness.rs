//! Readiness primitive
//!
//! The engine never blocks. Callers that want to block between `run` calls
//! use a [`Waiter`], a thin wrapper over a mio `Poll` keyed on the
//! transport's socket.

use std::io::{self, ErrorKind};
use std::thread;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

const WAIT_TOKEN: Token = Token(0);

/// Back-off used for transports that expose no pollable handle
const FALLBACK_INTERVAL: Duration = Duration::from_millis(1);

/// Interest set produced by the engine for the caller's wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub read: bool,
    pub write: bool,
}

impl Readiness {
    pub fn read() -> Self {
        Self { read: true, write: false }
    }

    pub fn write() -> Self {
        Self { read: false, write: true }
    }

    pub fn is_empty(&self) -> bool {
        !self.read && !self.write
    }

    /// The mio interest for this set, `None` when empty
    pub fn interest(&self) -> Option<Interest> {
        match (self.read, self.write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

/// Blocks the calling thread until a transport becomes ready
pub struct Waiter {
    poll: Poll,
    events: Events,
    registered: bool,

    /// Start of the current stretch of fallback waits
    fallback_since: Option<Instant>,
}

impl Waiter {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(4),
            registered: false,
            fallback_since: None,
        })
    }

    /// Forget fallback timing; call at the start of every logical wait loop
    pub fn reset(&mut self) {
        self.fallback_since = None;
    }

    /// Wait until `source` is ready for `readiness` or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout. An empty readiness set waits for
    /// reads. Without a source there is nothing to poll: the waiter backs off
    /// briefly and reports ready, and `timeout` then bounds the whole stretch
    /// of waits since the last [`reset`](Self::reset).
    pub fn wait(
        &mut self,
        source: Option<&mut dyn Source>,
        readiness: Readiness,
        timeout: Duration,
    ) -> io::Result<bool> {
        let Some(source) = source else {
            let since = *self.fallback_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(FALLBACK_INTERVAL.min(timeout));
            return Ok(true);
        };

        let interest = readiness.interest().unwrap_or(Interest::READABLE);
        if self.registered {
            self.poll.registry().reregister(source, WAIT_TOKEN, interest)?;
        } else {
            self.poll.registry().register(source, WAIT_TOKEN, interest)?;
            self.registered = true;
        }

        loop {
            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => return Ok(!self.events.is_empty()),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Deregister `source` so another poll can take it over
    pub fn release(&mut self, source: Option<&mut dyn Source>) {
        if !self.registered {
            return;
        }
        if let Some(source) = source {
            if let Err(e) = self.poll.registry().deregister(source) {
                tracing::debug!(error = %e, "failed to deregister transport");
            }
        }
        self.registered = false;
    }
}
