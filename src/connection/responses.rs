//! Response decoders
//!
//! One function per response shape, each turning a successful response into
//! the typed value its caller asked for. A response missing the body its
//! request implies is reported as an internal error.

use bytes::Bytes;

use crate::protocol::{Command, DriveLog};
use crate::record::KineticRecord;
use crate::status::{KineticStatus, StatusCode};

fn missing(what: &str) -> KineticStatus {
    KineticStatus::new(
        StatusCode::ClientInternalError,
        format!("response carried no {}", what),
    )
}

/// Responses whose success status is the whole answer
pub(crate) fn empty(_response: &Command, _value: Bytes) -> Result<(), KineticStatus> {
    Ok(())
}

/// Get, get-next and get-previous: the key found and its record
pub(crate) fn record(response: &Command, value: Bytes) -> Result<(Vec<u8>, KineticRecord), KineticStatus> {
    let kv = response.key_value().ok_or_else(|| missing("key/value body"))?;
    let key = kv.key.clone().ok_or_else(|| missing("key"))?;

    let record = KineticRecord::new(
        value.to_vec(),
        kv.db_version.clone().unwrap_or_default(),
        kv.tag.clone().unwrap_or_default(),
        kv.algorithm,
    );
    Ok((key, record))
}

pub(crate) fn version(response: &Command, _value: Bytes) -> Result<Vec<u8>, KineticStatus> {
    let kv = response.key_value().ok_or_else(|| missing("key/value body"))?;
    Ok(kv.db_version.clone().unwrap_or_default())
}

pub(crate) fn key_range(response: &Command, _value: Bytes) -> Result<Vec<Vec<u8>>, KineticStatus> {
    let range = response.range().ok_or_else(|| missing("range body"))?;
    Ok(range.keys.clone())
}

/// The drive log; a device log's contents travel in the value payload
pub(crate) fn drive_log(response: &Command, value: Bytes) -> Result<DriveLog, KineticStatus> {
    let get_log = response.get_log().ok_or_else(|| missing("log body"))?;
    let mut log = get_log.log.clone();
    if !value.is_empty() {
        log.device_log = Some(value.to_vec());
    }
    Ok(log)
}

/// Status of each operation in a peer-to-peer push, in request order.
///
/// An operation the drive did not report on counts as not attempted.
pub(crate) fn p2p_statuses(response: &Command, _value: Bytes) -> Result<Vec<KineticStatus>, KineticStatus> {
    let p2p = response.p2p_operation().ok_or_else(|| missing("peer-to-peer body"))?;

    let statuses = p2p
        .operations
        .iter()
        .map(|op| match &op.status {
            Some(status) => KineticStatus::from_wire(status),
            None => KineticStatus::new(StatusCode::RemoteOtherError, "operation not attempted"),
        })
        .collect();
    Ok(statuses)
}

