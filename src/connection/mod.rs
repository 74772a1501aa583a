//! Connection Module
//!
//! The caller-facing layers over the engine.
//!
//! ## Layers
//! - [`NonblockingConnection`]: builds requests, decodes responses, fires
//!   callbacks from `run`
//! - [`BlockingConnection`]: one synchronous call per operation
//! - [`BatchOperation`]: atomic groups of writes on a blocking connection
//! - [`Synchronized`]: lock-guarded facade over either connection

mod responses;
mod nonblocking;
mod blocking;
mod batch;
mod threadsafe;

pub use nonblocking::{BatchId, NonblockingConnection, PersistMode, WriteMode};
pub use blocking::BlockingConnection;
pub use batch::{BatchOperation, BATCH_TIMEOUT};
pub use threadsafe::{Synchronized, ThreadsafeBlockingConnection, ThreadsafeNonblockingConnection};
