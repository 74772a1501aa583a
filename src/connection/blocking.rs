//! Blocking connection
//!
//! Wraps a [`NonblockingConnection`] and turns every operation into a
//! synchronous call: submit, then alternate between waiting on the transport
//! and running the service until the response arrives.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ConnectionOptions;
use crate::engine::{Callback, HandlerKey};
use crate::error::Result;
use crate::network::{Readiness, Waiter};
use crate::protocol::{Acl, DriveLog, LogType, P2POp, Peer};
use crate::record::KineticRecord;
use crate::status::{KineticStatus, StatusCode};

use super::batch::BatchOperation;
use super::nonblocking::{BatchId, NonblockingConnection, PersistMode, WriteMode};

/// Slot a request's outcome is parked in until the caller picks it up
type Slot<T> = Arc<Mutex<Option<std::result::Result<T, KineticStatus>>>>;

/// How long to wait and what a timeout means
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitPolicy {
    pub timeout: Duration,
    pub on_timeout: StatusCode,
}

/// Synchronous connection to one drive
pub struct BlockingConnection {
    inner: NonblockingConnection,
    waiter: Waiter,
    network_timeout: Duration,

    /// Batch ids are unique per connection
    next_batch_id: u32,
}

impl BlockingConnection {
    /// Open a connection and complete the handshake
    pub fn connect(options: &ConnectionOptions) -> Result<Self> {
        let inner = NonblockingConnection::connect(options)?;
        Self::new(inner, options.network_timeout)
    }

    /// Wrap an open non-blocking connection
    pub fn new(inner: NonblockingConnection, network_timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner,
            waiter: Waiter::new()?,
            network_timeout,
            next_batch_id: 1,
        })
    }

    /// The underlying connection, for pipelining requests by hand
    pub fn nonblocking(&mut self) -> &mut NonblockingConnection {
        &mut self.inner
    }

    pub fn into_nonblocking(self) -> NonblockingConnection {
        self.inner
    }

    pub fn network_timeout(&self) -> Duration {
        self.network_timeout
    }

    pub fn set_network_timeout(&mut self, timeout: Duration) {
        self.network_timeout = timeout;
    }

    pub fn connection_id(&self) -> Option<i64> {
        self.inner.connection_id()
    }

    // =========================================================================
    // Core wait loop
    // =========================================================================

    fn execute<T: Send + 'static>(
        &mut self,
        submit: impl FnOnce(&mut NonblockingConnection, Callback<T>) -> HandlerKey,
    ) -> std::result::Result<T, KineticStatus> {
        let policy = WaitPolicy {
            timeout: self.network_timeout,
            on_timeout: StatusCode::ClientNetworkTimeout,
        };
        self.execute_with(policy, submit)
    }

    /// Submit through `submit` and block until its callback fires
    pub(crate) fn execute_with<T: Send + 'static>(
        &mut self,
        policy: WaitPolicy,
        submit: impl FnOnce(&mut NonblockingConnection, Callback<T>) -> HandlerKey,
    ) -> std::result::Result<T, KineticStatus> {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        let key = submit(
            &mut self.inner,
            Box::new(move |result| {
                *sink.lock() = Some(result);
            }),
        );
        self.wait_for(key, &slot, policy)
    }

    /// Block until the outcome for `key` is in.
    ///
    /// The transport is released from the waiter's poll afterwards, so the
    /// caller may register it with their own between calls.
    fn wait_for<T>(
        &mut self,
        key: HandlerKey,
        slot: &Slot<T>,
        policy: WaitPolicy,
    ) -> std::result::Result<T, KineticStatus> {
        self.waiter.reset();
        let result = self.wait_loop(key, slot, policy);
        self.waiter.release(self.inner.source());
        result
    }

    /// Run once, then alternate waiting and running until the outcome is in.
    ///
    /// Only the first run may fail quietly: its failure already reached the
    /// handler. A later failed run means the connection died mid-call.
    fn wait_loop<T>(
        &mut self,
        key: HandlerKey,
        slot: &Slot<T>,
        policy: WaitPolicy,
    ) -> std::result::Result<T, KineticStatus> {
        let mut interest = self.inner.run().unwrap_or_else(Readiness::read);

        loop {
            if let Some(result) = slot.lock().take() {
                return result;
            }

            match self.waiter.wait(self.inner.source(), interest, policy.timeout) {
                Ok(true) => {}
                Ok(false) => {
                    self.inner.remove(key);
                    debug!(%key, timeout = ?policy.timeout, "timed out waiting for response");
                    return Err(KineticStatus::new(
                        policy.on_timeout,
                        format!("no response within {:?}", policy.timeout),
                    ));
                }
                Err(e) => {
                    self.inner.remove(key);
                    warn!(%key, error = %e, "waiting on the transport failed");
                    return Err(KineticStatus::new(
                        StatusCode::ClientIoError,
                        format!("wait failed: {}", e),
                    ));
                }
            }

            match self.inner.run() {
                Some(next) => interest = next,
                None => {
                    self.inner.remove(key);
                    return Err(KineticStatus::new(
                        StatusCode::ClientConnectionFailed,
                        "connection failed",
                    ));
                }
            }
        }
    }

    /// Write out fire-and-forget requests without waiting for anything
    pub(crate) fn pump(&mut self) -> std::result::Result<(), KineticStatus> {
        match self.inner.run() {
            Some(_) => Ok(()),
            None => Err(KineticStatus::new(
                StatusCode::ClientConnectionFailed,
                "connection failed",
            )),
        }
    }

    // =========================================================================
    // Key/value operations
    // =========================================================================

    pub fn noop(&mut self) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.noop(callback))
    }

    pub fn get(&mut self, key: &[u8]) -> std::result::Result<KineticRecord, KineticStatus> {
        let (_, record) = self.execute(|conn, callback| conn.get(key, callback))?;
        Ok(record)
    }

    /// The key following `key` and its record
    pub fn get_next(&mut self, key: &[u8]) -> std::result::Result<(Vec<u8>, KineticRecord), KineticStatus> {
        self.execute(|conn, callback| conn.get_next(key, callback))
    }

    /// The key preceding `key` and its record
    pub fn get_previous(&mut self, key: &[u8]) -> std::result::Result<(Vec<u8>, KineticRecord), KineticStatus> {
        self.execute(|conn, callback| conn.get_previous(key, callback))
    }

    pub fn get_version(&mut self, key: &[u8]) -> std::result::Result<Vec<u8>, KineticStatus> {
        self.execute(|conn, callback| conn.get_version(key, callback))
    }

    pub fn get_key_range(
        &mut self,
        start_key: &[u8],
        start_key_inclusive: bool,
        end_key: &[u8],
        end_key_inclusive: bool,
        reverse: bool,
        max_returned: u32,
    ) -> std::result::Result<Vec<Vec<u8>>, KineticStatus> {
        self.execute(|conn, callback| {
            conn.get_key_range(
                start_key,
                start_key_inclusive,
                end_key,
                end_key_inclusive,
                reverse,
                max_returned,
                callback,
            )
        })
    }

    pub fn put(
        &mut self,
        key: &[u8],
        current_version: &[u8],
        mode: WriteMode,
        record: &KineticRecord,
        persist: PersistMode,
    ) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.put(key, current_version, mode, record, persist, callback))
    }

    pub fn delete(
        &mut self,
        key: &[u8],
        version: &[u8],
        mode: WriteMode,
        persist: PersistMode,
    ) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.delete(key, version, mode, persist, callback))
    }

    pub fn flush(&mut self) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.flush(callback))
    }

    // =========================================================================
    // Device administration
    // =========================================================================

    pub fn instant_erase(&mut self, pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.instant_erase(pin, callback))
    }

    pub fn secure_erase(&mut self, pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.secure_erase(pin, callback))
    }

    pub fn lock_device(&mut self, pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.lock_device(pin, callback))
    }

    pub fn unlock_device(&mut self, pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.unlock_device(pin, callback))
    }

    pub fn set_erase_pin(&mut self, old_pin: &[u8], new_pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.set_erase_pin(old_pin, new_pin, callback))
    }

    pub fn set_lock_pin(&mut self, old_pin: &[u8], new_pin: &[u8]) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.set_lock_pin(old_pin, new_pin, callback))
    }

    pub fn set_acls(&mut self, acls: Vec<Acl>) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.set_acls(acls, callback))
    }

    pub fn set_cluster_version(&mut self, version: i64) -> std::result::Result<(), KineticStatus> {
        self.execute(|conn, callback| conn.set_cluster_version(version, callback))
    }

    pub fn set_client_cluster_version(&mut self, version: i64) {
        self.inner.set_client_cluster_version(version);
    }

    pub fn update_firmware(&mut self, image: impl Into<Bytes>) -> std::result::Result<(), KineticStatus> {
        let image = image.into();
        self.execute(|conn, callback| conn.update_firmware(image, callback))
    }

    pub fn get_log(&mut self, types: Vec<LogType>) -> std::result::Result<DriveLog, KineticStatus> {
        self.execute(|conn, callback| conn.get_log(types, callback))
    }

    pub fn get_device_log(&mut self, name: &[u8]) -> std::result::Result<DriveLog, KineticStatus> {
        self.execute(|conn, callback| conn.get_device_log(name, callback))
    }

    pub fn p2p_push(
        &mut self,
        peer: Peer,
        operations: Vec<P2POp>,
    ) -> std::result::Result<Vec<KineticStatus>, KineticStatus> {
        self.execute(|conn, callback| conn.p2p_push(peer, operations, callback))
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Open a batch on the drive
    pub fn batch(&mut self) -> std::result::Result<BatchOperation<'_>, KineticStatus> {
        let batch = BatchId(self.next_batch_id);
        self.next_batch_id = self.next_batch_id.wrapping_add(1).max(1);

        self.execute(|conn, callback| conn.start_batch(batch, callback))?;
        debug!(batch = batch.0, "batch started");
        Ok(BatchOperation::new(self, batch))
    }
}
