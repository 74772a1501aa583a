//! Non-blocking connection
//!
//! Turns drive operations into messages submitted to a
//! [`MultiplexingService`]. Every operation returns at once with a
//! [`HandlerKey`]; its callback fires from inside a later
//! [`run`](NonblockingConnection::run) call.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mio::event::Source;
use mio::{Registry, Token};
use tracing::{debug, info};

use crate::config::ConnectionOptions;
use crate::engine::{Callback, CallbackHandler, Decoder, HandlerKey, MultiplexingService};
use crate::error::Result;
use crate::network::{Readiness, TcpTransport, TlsTransport, Transport};
use crate::protocol::{
    Acl, Batch, Body, Command, DriveLog, GetLog, KeyValue, LogType, Message, MessageType, P2POp,
    P2POperation, Peer, PinOpType, PinOperation, Priority, Range, Security, Setup,
    Synchronization,
};
use crate::record::KineticRecord;
use crate::signer::{HmacSha1Signer, Signer};
use crate::status::KineticStatus;

use super::responses;

/// Whether a write checks the stored version first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with a version mismatch unless the stored version matches
    RequireSameVersion,

    /// Overwrite regardless of the stored version
    IgnoreVersion,
}

/// How durable a write must be before the drive acknowledges it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    WriteThrough,
    #[default]
    WriteBack,
    Flush,
}

impl From<PersistMode> for Synchronization {
    fn from(mode: PersistMode) -> Self {
        match mode {
            PersistMode::WriteThrough => Synchronization::WriteThrough,
            PersistMode::WriteBack => Synchronization::WriteBack,
            PersistMode::Flush => Synchronization::Flush,
        }
    }
}

/// A batch being assembled on the drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u32);

/// Callback-style connection to one drive
pub struct NonblockingConnection {
    service: MultiplexingService,

    cluster_version: i64,
    priority: Priority,
    request_timeout: Option<Duration>,
}

impl NonblockingConnection {
    /// Open a TCP or TLS connection and complete the handshake
    pub fn connect(options: &ConnectionOptions) -> Result<Self> {
        options.validate()?;

        info!(host = %options.host, port = options.port, tls = options.tls.is_some(), "connecting to drive");

        let transport: Box<dyn Transport> = match &options.tls {
            Some(config) => Box::new(TlsTransport::connect(
                &options.host,
                options.port,
                options.connect_timeout,
                Arc::clone(config),
            )?),
            None => Box::new(TcpTransport::connect(
                &options.host,
                options.port,
                options.connect_timeout,
            )?),
        };

        Self::with_transport(transport, options)
    }

    /// Run the handshake over an already connected transport
    pub fn with_transport(transport: Box<dyn Transport>, options: &ConnectionOptions) -> Result<Self> {
        Self::with_signer(transport, Arc::new(HmacSha1Signer), options)
    }

    /// Like [`with_transport`](Self::with_transport), with a custom signer
    pub fn with_signer(
        transport: Box<dyn Transport>,
        signer: Arc<dyn Signer>,
        options: &ConnectionOptions,
    ) -> Result<Self> {
        let service = MultiplexingService::new(transport, signer, options)?;
        Ok(Self {
            service,
            cluster_version: options.cluster_version,
            priority: options.priority,
            request_timeout: options.request_timeout,
        })
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Make progress; see [`MultiplexingService::run`]
    pub fn run(&mut self) -> Option<Readiness> {
        self.service.run()
    }

    /// Cancel a request silently
    pub fn remove(&mut self, key: HandlerKey) -> bool {
        let removed = self.service.remove(key);
        if removed {
            debug!(%key, "request cancelled");
        }
        removed
    }

    pub fn source(&mut self) -> Option<&mut dyn Source> {
        self.service.source()
    }

    pub fn register(&mut self, registry: &Registry, token: Token, readiness: Readiness) -> std::io::Result<()> {
        self.service.register(registry, token, readiness)
    }

    pub fn reregister(&mut self, registry: &Registry, token: Token, readiness: Readiness) -> std::io::Result<()> {
        self.service.reregister(registry, token, readiness)
    }

    pub fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.service.deregister(registry)
    }

    pub fn connection_id(&self) -> Option<i64> {
        self.service.connection_id()
    }

    pub fn handshake_response(&self) -> &Command {
        self.service.handshake_response()
    }

    pub fn is_alive(&self) -> bool {
        self.service.is_alive()
    }

    // =========================================================================
    // Per-connection request defaults
    // =========================================================================

    pub fn cluster_version(&self) -> i64 {
        self.cluster_version
    }

    /// Change the cluster version sent with later requests. Does not touch
    /// the drive; see [`set_cluster_version`](Self::set_cluster_version).
    pub fn set_client_cluster_version(&mut self, version: i64) {
        self.cluster_version = version;
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub fn set_request_timeout(&mut self, timeout: Option<Duration>) {
        self.request_timeout = timeout;
    }

    fn prepare(&self, mut command: Command) -> Command {
        command.header.cluster_version = Some(self.cluster_version);
        command.header.priority = Some(self.priority);
        command.header.timeout = self
            .request_timeout
            .map(|timeout| i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX));
        command
    }

    fn submit<T: 'static>(
        &mut self,
        message: Message,
        command: Command,
        value: Bytes,
        decode: Decoder<T>,
        callback: Callback<T>,
    ) -> HandlerKey {
        let command = self.prepare(command);
        let handler = Box::new(CallbackHandler::new(decode, callback));
        self.service.submit(message, command, value, Some(handler))
    }

    /// Submit a command whose response nobody waits for
    fn submit_unacknowledged(&mut self, command: Command, value: Bytes) -> HandlerKey {
        let command = self.prepare(command);
        self.service.submit(Message::hmac(), command, value, None)
    }

    // =========================================================================
    // Key/value operations
    // =========================================================================

    pub fn noop(&mut self, callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        let command = Command::new(MessageType::NoOp, Body::Empty);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    pub fn get(
        &mut self,
        key: &[u8],
        callback: impl FnOnce(std::result::Result<(Vec<u8>, KineticRecord), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        self.read_record(MessageType::Get, key, Box::new(callback))
    }

    /// The first key after `key` and its record
    pub fn get_next(
        &mut self,
        key: &[u8],
        callback: impl FnOnce(std::result::Result<(Vec<u8>, KineticRecord), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        self.read_record(MessageType::GetNext, key, Box::new(callback))
    }

    /// The last key before `key` and its record
    pub fn get_previous(
        &mut self,
        key: &[u8],
        callback: impl FnOnce(std::result::Result<(Vec<u8>, KineticRecord), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        self.read_record(MessageType::GetPrevious, key, Box::new(callback))
    }

    fn read_record(
        &mut self,
        message_type: MessageType,
        key: &[u8],
        callback: Callback<(Vec<u8>, KineticRecord)>,
    ) -> HandlerKey {
        let command = Command::new(
            message_type,
            Body::KeyValue(KeyValue {
                key: Some(key.to_vec()),
                ..KeyValue::default()
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::record, callback)
    }

    pub fn get_version(
        &mut self,
        key: &[u8],
        callback: impl FnOnce(std::result::Result<Vec<u8>, KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::GetVersion,
            Body::KeyValue(KeyValue {
                key: Some(key.to_vec()),
                ..KeyValue::default()
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::version, Box::new(callback))
    }

    /// Up to `max_returned` keys between `start_key` and `end_key`
    #[allow(clippy::too_many_arguments)]
    pub fn get_key_range(
        &mut self,
        start_key: &[u8],
        start_key_inclusive: bool,
        end_key: &[u8],
        end_key_inclusive: bool,
        reverse: bool,
        max_returned: u32,
        callback: impl FnOnce(std::result::Result<Vec<Vec<u8>>, KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::GetKeyRange,
            Body::Range(Range {
                start_key: start_key.to_vec(),
                end_key: end_key.to_vec(),
                start_key_inclusive,
                end_key_inclusive,
                max_returned,
                reverse,
                keys: Vec::new(),
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::key_range, Box::new(callback))
    }

    /// Store `record` under `key`.
    ///
    /// With [`WriteMode::RequireSameVersion`] the drive compares
    /// `current_version` to the stored version first.
    pub fn put(
        &mut self,
        key: &[u8],
        current_version: &[u8],
        mode: WriteMode,
        record: &KineticRecord,
        persist: PersistMode,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let (command, value) = put_command(key, current_version, mode, record, persist);
        self.submit(Message::hmac(), command, value, responses::empty, Box::new(callback))
    }

    pub fn delete(
        &mut self,
        key: &[u8],
        version: &[u8],
        mode: WriteMode,
        persist: PersistMode,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = delete_command(key, version, mode, persist);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    /// Persist everything written with a weaker persist mode
    pub fn flush(&mut self, callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        let command = Command::new(MessageType::FlushAllData, Body::Empty);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    // =========================================================================
    // Device administration
    // =========================================================================

    /// Erase every key; authenticated by the erase PIN
    pub fn instant_erase(&mut self, pin: &[u8], callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        self.pin_operation(PinOpType::Erase, pin, Box::new(callback))
    }

    /// Erase every key and overwrite the media; authenticated by the erase PIN
    pub fn secure_erase(&mut self, pin: &[u8], callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        self.pin_operation(PinOpType::SecureErase, pin, Box::new(callback))
    }

    pub fn lock_device(&mut self, pin: &[u8], callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        self.pin_operation(PinOpType::Lock, pin, Box::new(callback))
    }

    pub fn unlock_device(&mut self, pin: &[u8], callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        self.pin_operation(PinOpType::Unlock, pin, Box::new(callback))
    }

    fn pin_operation(&mut self, pin_op_type: PinOpType, pin: &[u8], callback: Callback<()>) -> HandlerKey {
        let command = Command::new(
            MessageType::PinOp,
            Body::PinOperation(PinOperation { pin_op_type }),
        );
        self.submit(Message::pin(pin), command, Bytes::new(), responses::empty, callback)
    }

    pub fn set_erase_pin(
        &mut self,
        old_pin: &[u8],
        new_pin: &[u8],
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let security = Security {
            old_erase_pin: Some(old_pin.to_vec()),
            new_erase_pin: Some(new_pin.to_vec()),
            ..Security::default()
        };
        self.security(security, Box::new(callback))
    }

    pub fn set_lock_pin(
        &mut self,
        old_pin: &[u8],
        new_pin: &[u8],
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let security = Security {
            old_lock_pin: Some(old_pin.to_vec()),
            new_lock_pin: Some(new_pin.to_vec()),
            ..Security::default()
        };
        self.security(security, Box::new(callback))
    }

    /// Replace the drive's access control list
    pub fn set_acls(&mut self, acls: Vec<Acl>, callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static) -> HandlerKey {
        let security = Security {
            acls,
            ..Security::default()
        };
        self.security(security, Box::new(callback))
    }

    fn security(&mut self, security: Security, callback: Callback<()>) -> HandlerKey {
        let command = Command::new(MessageType::Security, Body::Security(security));
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, callback)
    }

    /// Change the drive's cluster version. Later requests from this
    /// connection keep sending the old one until
    /// [`set_client_cluster_version`](Self::set_client_cluster_version).
    pub fn set_cluster_version(
        &mut self,
        new_cluster_version: i64,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::Setup,
            Body::Setup(Setup {
                new_cluster_version: Some(new_cluster_version),
                firmware_download: false,
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    /// Send a firmware image
    pub fn update_firmware(
        &mut self,
        image: impl Into<Bytes>,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::Setup,
            Body::Setup(Setup {
                new_cluster_version: None,
                firmware_download: true,
            }),
        );
        self.submit(Message::hmac(), command, image.into(), responses::empty, Box::new(callback))
    }

    pub fn get_log(
        &mut self,
        types: Vec<LogType>,
        callback: impl FnOnce(std::result::Result<DriveLog, KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::GetLog,
            Body::GetLog(GetLog {
                types,
                log: DriveLog::default(),
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::drive_log, Box::new(callback))
    }

    /// Fetch the vendor-specific device log called `name`
    pub fn get_device_log(
        &mut self,
        name: &[u8],
        callback: impl FnOnce(std::result::Result<DriveLog, KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::GetLog,
            Body::GetLog(GetLog {
                types: vec![LogType::Device],
                log: DriveLog {
                    device_name: Some(name.to_vec()),
                    ..DriveLog::default()
                },
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::drive_log, Box::new(callback))
    }

    /// Have the drive copy keys to `peer`. Reports one status per operation.
    pub fn p2p_push(
        &mut self,
        peer: Peer,
        operations: Vec<P2POp>,
        callback: impl FnOnce(std::result::Result<Vec<KineticStatus>, KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = Command::new(
            MessageType::PeerToPeerPush,
            Body::P2POperation(P2POperation {
                peer,
                operations,
                all_child_operations_succeeded: None,
            }),
        );
        self.submit(Message::hmac(), command, Bytes::new(), responses::p2p_statuses, Box::new(callback))
    }

    // =========================================================================
    // Batches
    // =========================================================================

    pub fn start_batch(
        &mut self,
        batch: BatchId,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = batch_command(MessageType::StartBatch, batch, Body::Empty);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    /// Add a put to an open batch. The drive only answers at the end of the
    /// batch, so no callback is taken.
    pub fn batch_put(
        &mut self,
        batch: BatchId,
        key: &[u8],
        current_version: &[u8],
        mode: WriteMode,
        record: &KineticRecord,
    ) -> HandlerKey {
        let (mut command, value) = put_command(key, current_version, mode, record, PersistMode::default());
        command.header.batch_id = Some(batch.0);
        self.submit_unacknowledged(command, value)
    }

    /// Add a delete to an open batch
    pub fn batch_delete(&mut self, batch: BatchId, key: &[u8], version: &[u8], mode: WriteMode) -> HandlerKey {
        let mut command = delete_command(key, version, mode, PersistMode::default());
        command.header.batch_id = Some(batch.0);
        self.submit_unacknowledged(command, Bytes::new())
    }

    /// Commit a batch of `count` operations
    pub fn end_batch(
        &mut self,
        batch: BatchId,
        count: u32,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let body = Body::Batch(Batch {
            count,
            ..Batch::default()
        });
        let command = batch_command(MessageType::EndBatch, batch, body);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }

    pub fn abort_batch(
        &mut self,
        batch: BatchId,
        callback: impl FnOnce(std::result::Result<(), KineticStatus>) + Send + 'static,
    ) -> HandlerKey {
        let command = batch_command(MessageType::AbortBatch, batch, Body::Empty);
        self.submit(Message::hmac(), command, Bytes::new(), responses::empty, Box::new(callback))
    }
}

// =============================================================================
// Command builders
// =============================================================================

fn put_command(
    key: &[u8],
    current_version: &[u8],
    mode: WriteMode,
    record: &KineticRecord,
    persist: PersistMode,
) -> (Command, Bytes) {
    let command = Command::new(
        MessageType::Put,
        Body::KeyValue(KeyValue {
            key: Some(key.to_vec()),
            new_version: Some(record.version().to_vec()),
            db_version: Some(current_version.to_vec()),
            force: Some(mode == WriteMode::IgnoreVersion),
            tag: Some(record.tag().to_vec()),
            algorithm: record.algorithm(),
            metadata_only: None,
            synchronization: Some(persist.into()),
        }),
    );
    (command, Bytes::copy_from_slice(record.value()))
}

fn delete_command(key: &[u8], version: &[u8], mode: WriteMode, persist: PersistMode) -> Command {
    Command::new(
        MessageType::Delete,
        Body::KeyValue(KeyValue {
            key: Some(key.to_vec()),
            db_version: Some(version.to_vec()),
            force: Some(mode == WriteMode::IgnoreVersion),
            synchronization: Some(persist.into()),
            ..KeyValue::default()
        }),
    )
}

fn batch_command(message_type: MessageType, batch: BatchId, body: Body) -> Command {
    let mut command = Command::new(message_type, body);
    command.header.batch_id = Some(batch.0);
    command
}
