//! Command definitions
//!
//! The inner, signed part of every message: a header used for sequencing and
//! correlation, a body whose shape depends on the message type, and a status
//! block filled in by the drive on responses.

use serde::{Deserialize, Serialize};

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Get,
    GetResponse,
    Put,
    PutResponse,
    Delete,
    DeleteResponse,
    GetNext,
    GetNextResponse,
    GetPrevious,
    GetPreviousResponse,
    GetKeyRange,
    GetKeyRangeResponse,
    GetVersion,
    GetVersionResponse,
    Setup,
    SetupResponse,
    GetLog,
    GetLogResponse,
    Security,
    SecurityResponse,
    PeerToPeerPush,
    PeerToPeerPushResponse,
    NoOp,
    NoOpResponse,
    FlushAllData,
    FlushAllDataResponse,
    PinOp,
    PinOpResponse,
    StartBatch,
    StartBatchResponse,
    EndBatch,
    EndBatchResponse,
    AbortBatch,
    AbortBatchResponse,
}

/// Scheduling priority hint sent with each command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Lowest,
    Lower,
    #[default]
    Normal,
    Higher,
    Highest,
}

/// Command header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub cluster_version: Option<i64>,
    pub connection_id: Option<i64>,
    pub sequence: Option<i64>,

    /// Sequence of the request a response answers
    pub ack_sequence: Option<i64>,
    pub message_type: Option<MessageType>,

    /// Milliseconds the drive may spend on the request
    pub timeout: Option<i64>,
    pub priority: Option<Priority>,
    pub early_exit: Option<bool>,
    pub batch_id: Option<u32>,
}

// =============================================================================
// Body
// =============================================================================

/// Command body, one shape per family of message types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Body {
    #[default]
    Empty,
    KeyValue(KeyValue),
    Range(Range),
    Setup(Setup),
    Security(Security),
    GetLog(GetLog),
    P2POperation(P2POperation),
    PinOperation(PinOperation),
    Batch(Batch),
}

/// Digest algorithm a record's tag was computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Sha1,
    Sha2,
    Sha3,
    Crc32,
    Crc64,
    Crc32c,
}

/// How the drive should persist a write before acknowledging it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Synchronization {
    WriteThrough,
    #[default]
    WriteBack,
    Flush,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Option<Vec<u8>>,
    pub new_version: Option<Vec<u8>>,
    pub db_version: Option<Vec<u8>>,
    pub force: Option<bool>,
    pub tag: Option<Vec<u8>>,
    pub algorithm: Option<Algorithm>,
    pub metadata_only: Option<bool>,
    pub synchronization: Option<Synchronization>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub start_key_inclusive: bool,
    pub end_key_inclusive: bool,
    pub max_returned: u32,
    pub reverse: bool,

    /// Filled in by the drive
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub new_cluster_version: Option<i64>,

    /// The value payload carries a firmware image
    pub firmware_download: bool,
}

// -----------------------------------------------------------------------------
// Security
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Delete,
    Range,
    Setup,
    P2POp,
    GetLog,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HmacAlgorithm {
    #[default]
    HmacSha1,
}

/// Permissions granted to an identity over keys matching `value` at `offset`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub offset: i64,
    pub value: Vec<u8>,
    pub permissions: Vec<Permission>,
    pub tls_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acl {
    pub identity: i64,
    pub key: Vec<u8>,
    pub hmac_algorithm: HmacAlgorithm,
    pub scopes: Vec<Scope>,
    pub max_priority: Option<Priority>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub acls: Vec<Acl>,
    pub old_lock_pin: Option<Vec<u8>>,
    pub new_lock_pin: Option<Vec<u8>>,
    pub old_erase_pin: Option<Vec<u8>>,
    pub new_erase_pin: Option<Vec<u8>>,
}

// -----------------------------------------------------------------------------
// Get log
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    Utilizations,
    Temperatures,
    Capacities,
    Configuration,
    Statistics,
    Messages,
    Limits,
    Device,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub name: String,
    pub value: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub name: String,
    pub current: f32,
    pub minimum: f32,
    pub maximum: f32,
    pub target: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub nominal_capacity_in_bytes: u64,
    pub portion_full: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub vendor: String,
    pub model: String,
    pub serial_number: Vec<u8>,
    pub world_wide_name: Vec<u8>,
    pub version: String,
    pub compilation_date: String,
    pub source_hash: String,
    pub protocol_version: String,
    pub port: u32,
    pub tls_port: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub message_type: MessageType,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub max_key_size: u32,
    pub max_value_size: u32,
    pub max_version_size: u32,
    pub max_tag_size: u32,
    pub max_connections: u32,
    pub max_outstanding_read_requests: u32,
    pub max_outstanding_write_requests: u32,
    pub max_message_size: u32,
    pub max_key_range_count: u32,
    pub max_identity_count: u32,
    pub max_pin_size: u32,
    pub max_operation_count_per_batch: u32,
    pub max_batch_count_per_device: u32,
}

/// Drive state reported by a get-log request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveLog {
    pub utilizations: Vec<Utilization>,
    pub temperatures: Vec<Temperature>,
    pub capacity: Option<Capacity>,
    pub configuration: Option<Configuration>,
    pub statistics: Vec<Statistics>,
    pub messages: Vec<u8>,
    pub limits: Option<Limits>,

    /// Name of the vendor-specific device log requested
    pub device_name: Option<Vec<u8>>,

    /// Contents of the device log, taken from the response's value payload
    #[serde(skip)]
    pub device_log: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLog {
    pub types: Vec<LogType>,
    pub log: DriveLog,
}

// -----------------------------------------------------------------------------
// Peer to peer
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub hostname: String,
    pub port: u32,
    pub tls: bool,
}

/// One key copied to a peer, optionally followed by a nested push from that
/// peer onward
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct P2POp {
    pub key: Vec<u8>,
    pub version: Option<Vec<u8>>,
    pub new_key: Option<Vec<u8>>,
    pub force: bool,
    pub status: Option<Status>,
    pub nested: Option<Box<P2POperation>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct P2POperation {
    pub peer: Peer,
    pub operations: Vec<P2POp>,
    pub all_child_operations_succeeded: Option<bool>,
}

// -----------------------------------------------------------------------------
// PIN operations and batches
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinOpType {
    Unlock,
    Lock,
    Erase,
    SecureErase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinOperation {
    pub pin_op_type: PinOpType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Number of operations the batch contains
    pub count: u32,
    pub sequences: Vec<i64>,
    pub failed_sequence: Option<i64>,
}

// =============================================================================
// Status
// =============================================================================

/// Status codes as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireStatusCode {
    InvalidStatusCode,
    NotAttempted,
    Success,
    HmacFailure,
    NotAuthorized,
    VersionFailure,
    InternalError,
    HeaderRequired,
    NotFound,
    VersionMismatch,
    ServiceBusy,
    Expired,
    DataError,
    PermDataError,
    RemoteConnectionError,
    NoSpace,
    NoSuchHmacAlgorithm,
    InvalidRequest,
    NestedOperationErrors,
    DeviceLocked,
    DeviceAlreadyUnlocked,
    ConnectionTerminated,
    InvalidBatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub code: WireStatusCode,
    pub status_message: Option<String>,
    pub detailed_message: Option<Vec<u8>>,
}

impl Status {
    pub fn new(code: WireStatusCode) -> Self {
        Self {
            code,
            status_message: None,
            detailed_message: None,
        }
    }

    pub fn with_message(code: WireStatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status_message: Some(message.into()),
            detailed_message: None,
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A parsed command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub header: Header,
    pub body: Body,
    pub status: Option<Status>,
}

impl Command {
    /// Create a request command of the given type
    pub fn new(message_type: MessageType, body: Body) -> Self {
        Self {
            header: Header {
                message_type: Some(message_type),
                ..Header::default()
            },
            body,
            status: None,
        }
    }

    /// Get the message type
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type
    }

    /// Whether the drive reported success
    pub fn is_success(&self) -> bool {
        matches!(&self.status, Some(status) if status.code == WireStatusCode::Success)
    }

    pub fn key_value(&self) -> Option<&KeyValue> {
        match &self.body {
            Body::KeyValue(kv) => Some(kv),
            _ => None,
        }
    }

    pub fn range(&self) -> Option<&Range> {
        match &self.body {
            Body::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn get_log(&self) -> Option<&GetLog> {
        match &self.body {
            Body::GetLog(get_log) => Some(get_log),
            _ => None,
        }
    }

    pub fn p2p_operation(&self) -> Option<&P2POperation> {
        match &self.body {
            Body::P2POperation(op) => Some(op),
            _ => None,
        }
    }
}
