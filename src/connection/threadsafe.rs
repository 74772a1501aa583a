//! Thread-safe connections
//!
//! [`Synchronized`] serializes every call into the wrapped connection
//! behind one re-entrant lock. Callbacks fire while the lock is held, so a
//! callback that calls back into the same facade would alias the connection;
//! such calls are rejected with `ClientInternalError`.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;
use tracing::warn;

use crate::status::{KineticStatus, StatusCode};

use super::blocking::BlockingConnection;
use super::nonblocking::NonblockingConnection;

/// Mutex-guarded wrapper around a connection
pub struct Synchronized<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

/// Non-blocking connection shareable across threads
pub type ThreadsafeNonblockingConnection = Synchronized<NonblockingConnection>;

/// Blocking connection shareable across threads
pub type ThreadsafeBlockingConnection = Synchronized<BlockingConnection>;

impl<T> Synchronized<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(inner)),
        }
    }

    /// Run `f` with exclusive access to the wrapped value
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, KineticStatus> {
        let guard = self.inner.lock();
        let Ok(mut inner) = guard.try_borrow_mut() else {
            warn!("re-entrant call into a synchronized connection");
            return Err(KineticStatus::new(
                StatusCode::ClientInternalError,
                "re-entrant call into a synchronized connection",
            ));
        };
        Ok(f(&mut inner))
    }

    /// [`with`](Self::with) for calls that already return a status
    pub fn call<R>(&self, f: impl FnOnce(&mut T) -> Result<R, KineticStatus>) -> Result<R, KineticStatus> {
        self.with(f)?
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}

impl<T> From<T> for Synchronized<T> {
    fn from(inner: T) -> Self {
        Self::new(inner)
    }
}
