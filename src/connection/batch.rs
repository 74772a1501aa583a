//! Batch operation
//!
//! Groups puts and deletes that the drive applies atomically. The individual
//! operations are sent without waiting; only the final commit or abort is
//! answered.

use std::time::Duration;

use tracing::{debug, warn};

use crate::record::KineticRecord;
use crate::status::{KineticStatus, StatusCode};

use super::blocking::{BlockingConnection, WaitPolicy};
use super::nonblocking::{BatchId, WriteMode};

/// Wait applied to each readiness check while finishing a batch
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(20);

/// An open batch on a blocking connection
pub struct BatchOperation<'a> {
    connection: &'a mut BlockingConnection,
    batch: BatchId,

    /// Operations sent so far
    count: u32,
    finished: bool,
}

impl<'a> BatchOperation<'a> {
    pub(crate) fn new(connection: &'a mut BlockingConnection, batch: BatchId) -> Self {
        Self {
            connection,
            batch,
            count: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> BatchId {
        self.batch
    }

    /// Number of operations added so far
    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn put(
        &mut self,
        key: &[u8],
        current_version: &[u8],
        mode: WriteMode,
        record: &KineticRecord,
    ) -> Result<(), KineticStatus> {
        let batch = self.batch;
        self.connection
            .nonblocking()
            .batch_put(batch, key, current_version, mode, record);
        self.count += 1;
        self.connection.pump()
    }

    pub fn delete(&mut self, key: &[u8], version: &[u8], mode: WriteMode) -> Result<(), KineticStatus> {
        let batch = self.batch;
        self.connection
            .nonblocking()
            .batch_delete(batch, key, version, mode);
        self.count += 1;
        self.connection.pump()
    }

    /// Ask the drive to apply every operation in the batch
    pub fn commit(mut self) -> Result<(), KineticStatus> {
        self.finished = true;
        let (batch, count) = (self.batch, self.count);
        debug!(batch = batch.0, count, "committing batch");

        self.connection
            .execute_with(batch_policy(), |conn, callback| conn.end_batch(batch, count, callback))
    }

    /// Discard the batch on the drive
    pub fn abort(mut self) -> Result<(), KineticStatus> {
        self.finished = true;
        let batch = self.batch;
        debug!(batch = batch.0, "aborting batch");

        self.connection
            .execute_with(batch_policy(), |conn, callback| conn.abort_batch(batch, callback))
    }
}

fn batch_policy() -> WaitPolicy {
    WaitPolicy {
        timeout: BATCH_TIMEOUT,
        on_timeout: StatusCode::ClientIoError,
    }
}

impl Drop for BatchOperation<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // Neither committed nor aborted: abort without waiting
        warn!(batch = self.batch.0, count = self.count, "batch dropped while open, aborting");
        let batch = self.batch;
        self.connection.nonblocking().abort_batch(batch, move |result| {
            if let Err(status) = result {
                debug!(batch = batch.0, %status, "abort of dropped batch failed");
            }
        });
        if self.connection.pump().is_err() {
            debug!(batch = batch.0, "connection failed while aborting dropped batch");
        }
    }
}
