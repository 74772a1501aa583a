//! Client-facing status taxonomy
//!
//! Every request outcome, whether produced by the drive or synthesized by
//! the client, ends up as a [`KineticStatus`].

use std::fmt;

use crate::protocol::{Command, Status, WireStatusCode};

/// Closed set of outcomes a caller can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,

    // -------------------------------------------------------------------------
    // Client-side
    // -------------------------------------------------------------------------
    ClientIoError,
    ClientShutdown,
    ClientInternalError,
    ClientResponseHmacVerificationError,
    ClientResponseTooLarge,
    ClientNetworkTimeout,
    ClientConnectionFailed,
    ProtocolErrorResponseNoAckSequence,

    // -------------------------------------------------------------------------
    // Reported by the drive
    // -------------------------------------------------------------------------
    RemoteHmacError,
    RemoteNotAuthorized,
    RemoteClusterVersionMismatch,
    RemoteInternalError,
    RemoteHeaderRequired,
    RemoteNotFound,
    RemoteVersionMismatch,
    RemoteServiceBusy,
    RemoteExpired,
    RemoteDataError,
    RemotePermDataError,
    RemoteRemoteConnectionError,
    RemoteNoSpace,
    RemoteNoSuchHmacAlgorithm,
    RemoteInvalidRequest,
    RemoteNestedOperationErrors,
    RemoteDeviceLocked,
    RemoteDeviceAlreadyUnlocked,
    RemoteConnectionTerminated,
    RemoteInvalidBatch,
    RemoteOtherError,
}

impl StatusCode {
    /// Whether this code was produced by the drive rather than the client
    pub fn is_remote(&self) -> bool {
        !matches!(
            self,
            StatusCode::Ok
                | StatusCode::ClientIoError
                | StatusCode::ClientShutdown
                | StatusCode::ClientInternalError
                | StatusCode::ClientResponseHmacVerificationError
                | StatusCode::ClientResponseTooLarge
                | StatusCode::ClientNetworkTimeout
                | StatusCode::ClientConnectionFailed
                | StatusCode::ProtocolErrorResponseNoAckSequence
        )
    }
}

impl From<WireStatusCode> for StatusCode {
    fn from(code: WireStatusCode) -> Self {
        match code {
            WireStatusCode::Success => StatusCode::Ok,
            WireStatusCode::HmacFailure => StatusCode::RemoteHmacError,
            WireStatusCode::NotAuthorized => StatusCode::RemoteNotAuthorized,
            WireStatusCode::VersionFailure => StatusCode::RemoteClusterVersionMismatch,
            WireStatusCode::InternalError => StatusCode::RemoteInternalError,
            WireStatusCode::HeaderRequired => StatusCode::RemoteHeaderRequired,
            WireStatusCode::NotFound => StatusCode::RemoteNotFound,
            WireStatusCode::VersionMismatch => StatusCode::RemoteVersionMismatch,
            WireStatusCode::ServiceBusy => StatusCode::RemoteServiceBusy,
            WireStatusCode::Expired => StatusCode::RemoteExpired,
            WireStatusCode::DataError => StatusCode::RemoteDataError,
            WireStatusCode::PermDataError => StatusCode::RemotePermDataError,
            WireStatusCode::RemoteConnectionError => StatusCode::RemoteRemoteConnectionError,
            WireStatusCode::NoSpace => StatusCode::RemoteNoSpace,
            WireStatusCode::NoSuchHmacAlgorithm => StatusCode::RemoteNoSuchHmacAlgorithm,
            WireStatusCode::InvalidRequest => StatusCode::RemoteInvalidRequest,
            WireStatusCode::NestedOperationErrors => StatusCode::RemoteNestedOperationErrors,
            WireStatusCode::DeviceLocked => StatusCode::RemoteDeviceLocked,
            WireStatusCode::DeviceAlreadyUnlocked => StatusCode::RemoteDeviceAlreadyUnlocked,
            WireStatusCode::ConnectionTerminated => StatusCode::RemoteConnectionTerminated,
            WireStatusCode::InvalidBatch => StatusCode::RemoteInvalidBatch,
            WireStatusCode::InvalidStatusCode | WireStatusCode::NotAttempted => {
                StatusCode::RemoteOtherError
            }
        }
    }
}

/// Outcome of a request: a code, a human readable message, and for
/// cluster-version mismatches the version the drive expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KineticStatus {
    code: StatusCode,
    message: String,
    expected_cluster_version: Option<i64>,
}

impl KineticStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            expected_cluster_version: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    /// Status for a cluster version mismatch, carrying the drive's version
    pub fn cluster_version_mismatch(message: impl Into<String>, expected: i64) -> Self {
        Self {
            code: StatusCode::RemoteClusterVersionMismatch,
            message: message.into(),
            expected_cluster_version: Some(expected),
        }
    }

    /// Converts the status block of a drive response
    pub fn from_response(response: &Command) -> Self {
        let Some(status) = &response.status else {
            return Self::new(StatusCode::RemoteOtherError, "response carried no status");
        };

        let converted = Self::from_wire(status);
        if converted.code == StatusCode::RemoteClusterVersionMismatch {
            if let Some(expected) = response.header.cluster_version {
                return Self::cluster_version_mismatch(converted.message, expected);
            }
        }

        converted
    }

    /// Converts a bare wire status, such as one attached to a nested
    /// peer-to-peer operation
    pub fn from_wire(status: &Status) -> Self {
        Self::new(
            StatusCode::from(status.code),
            status.status_message.clone().unwrap_or_default(),
        )
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn expected_cluster_version(&self) -> Option<i64> {
        self.expected_cluster_version
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn into_result(self) -> Result<(), KineticStatus> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for KineticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for KineticStatus {}
