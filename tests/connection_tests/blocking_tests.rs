//! Blocking Connection Tests
//!
//! Tests for synchronous calls, timeouts, connection failure and batches.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    ok_frame, options, response, signed_frame, status_frame, MockTransport, Request,
};
use kinetic::protocol::{Body, KeyValue, MessageType, Range, WireStatusCode};
use kinetic::{
    BatchId, BlockingConnection, KineticRecord, NonblockingConnection, PersistMode, StatusCode,
    WriteMode,
};
use parking_lot::Mutex;

fn connect(transport: &MockTransport) -> BlockingConnection {
    let options = options();
    let inner = NonblockingConnection::with_transport(transport.boxed(), &options).unwrap();
    BlockingConnection::new(inner, options.network_timeout).unwrap()
}

fn message_types(transport: &MockTransport) -> Vec<Option<MessageType>> {
    transport
        .requests()
        .iter()
        .map(|r| r.command.message_type())
        .collect()
}

fn record() -> KineticRecord {
    KineticRecord::new(b"value".to_vec(), b"v1".to_vec(), Vec::new(), None)
}

// =============================================================================
// Call Tests
// =============================================================================

#[test]
fn test_noop() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    assert!(conn.noop().is_ok());
    assert_eq!(message_types(&transport), vec![Some(MessageType::NoOp)]);
}

#[test]
fn test_get_returns_record() {
    let transport = MockTransport::with_handshake();
    transport.set_responder(|request| {
        let body = Body::KeyValue(KeyValue {
            key: Some(b"k".to_vec()),
            db_version: Some(b"v9".to_vec()),
            ..KeyValue::default()
        });
        Some(signed_frame(
            &response(request.sequence(), WireStatusCode::Success, body),
            b"hello",
        ))
    });
    let mut conn = connect(&transport);

    let record = conn.get(b"k").unwrap();
    assert_eq!(record.value(), b"hello");
    assert_eq!(record.version(), b"v9");

    let (key, _) = conn.get_next(b"j").unwrap();
    assert_eq!(key, b"k");
}

#[test]
fn test_remote_error_returned() {
    let transport = MockTransport::with_handshake();
    transport.set_responder(|request| Some(status_frame(request.sequence(), WireStatusCode::NotFound)));
    let mut conn = connect(&transport);

    let status = conn.get(b"missing").unwrap_err();
    assert_eq!(status.code(), StatusCode::RemoteNotFound);
}

#[test]
fn test_response_arriving_later() {
    let transport = MockTransport::with_handshake();
    let answered = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&answered);
    // Answer the first request only once the client is already waiting
    let late = transport.clone();
    transport.set_responder(move |request: &Request| {
        let sequence = request.sequence();
        let late = late.clone();
        let flag = Arc::clone(&flag);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            late.push(&ok_frame(sequence));
            *flag.lock() = true;
        });
        None
    });
    let mut conn = connect(&transport);

    assert!(conn.noop().is_ok());
    assert!(*answered.lock());
}

#[test]
fn test_range_and_version() {
    let transport = MockTransport::with_handshake();
    transport.set_responder(|request| {
        let body = match request.command.message_type() {
            Some(MessageType::GetKeyRange) => Body::Range(Range {
                keys: vec![b"a".to_vec(), b"b".to_vec()],
                ..Range::default()
            }),
            _ => Body::KeyValue(KeyValue {
                db_version: Some(b"v4".to_vec()),
                ..KeyValue::default()
            }),
        };
        Some(signed_frame(&response(request.sequence(), WireStatusCode::Success, body), b""))
    });
    let mut conn = connect(&transport);

    let keys = conn.get_key_range(b"a", true, b"c", true, false, 10).unwrap();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(conn.get_version(b"a").unwrap(), b"v4");
}

#[test]
fn test_writes_and_admin_calls() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    conn.put(b"k", b"", WriteMode::IgnoreVersion, &record(), PersistMode::WriteBack)
        .unwrap();
    conn.delete(b"k", b"v1", WriteMode::RequireSameVersion, PersistMode::WriteThrough)
        .unwrap();
    conn.flush().unwrap();
    conn.set_cluster_version(3).unwrap();
    conn.lock_device(b"pin").unwrap();
    conn.update_firmware(b"image".to_vec()).unwrap();

    assert_eq!(
        message_types(&transport),
        vec![
            Some(MessageType::Put),
            Some(MessageType::Delete),
            Some(MessageType::FlushAllData),
            Some(MessageType::Setup),
            Some(MessageType::PinOp),
            Some(MessageType::Setup),
        ]
    );
}

#[test]
fn test_client_cluster_version() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    conn.set_client_cluster_version(5);
    conn.noop().unwrap();
    assert_eq!(
        transport.requests()[0].command.header.cluster_version,
        Some(5)
    );
}

#[test]
fn test_nonblocking_requests_complete_alongside() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    let fired = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&fired);
    conn.nonblocking().noop(move |result| *sink.lock() = Some(result));

    conn.noop().unwrap();
    assert!(fired.lock().take().unwrap().is_ok());
    assert_eq!(transport.requests().len(), 2);
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_timeout_then_recover() {
    let transport = MockTransport::with_handshake();
    let mut conn = connect(&transport);
    conn.set_network_timeout(Duration::from_millis(100));
    assert_eq!(conn.network_timeout(), Duration::from_millis(100));

    let started = Instant::now();
    let status = conn.noop().unwrap_err();
    assert_eq!(status.code(), StatusCode::ClientNetworkTimeout);
    assert!(started.elapsed() >= Duration::from_millis(100));

    // The late answer to the abandoned request is dropped
    transport.push(&ok_frame(0));
    transport.respond_ok();
    assert!(conn.noop().is_ok());
    assert!(conn.nonblocking().is_alive());
}

// =============================================================================
// Connection Failure Tests
// =============================================================================

#[test]
fn test_hang_up_mid_call() {
    let transport = MockTransport::with_handshake();
    transport.hang_up_on_request();
    let mut conn = connect(&transport);

    let status = conn.noop().unwrap_err();
    assert_eq!(status.code(), StatusCode::ClientConnectionFailed);
    assert!(!conn.nonblocking().is_alive());

    // Dead connections refuse further calls
    let status = conn.noop().unwrap_err();
    assert_eq!(status.code(), StatusCode::ClientShutdown);
}

#[test]
fn test_write_failure_reported() {
    let transport = MockTransport::with_handshake();
    transport.fail_writes();
    let mut conn = connect(&transport);

    let status = conn.noop().unwrap_err();
    assert_eq!(status.code(), StatusCode::ClientIoError);
    assert!(!conn.nonblocking().is_alive());
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_batch_commit() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    let mut batch = conn.batch().unwrap();
    assert_eq!(batch.id(), BatchId(1));
    assert!(batch.is_empty());

    batch.put(b"a", b"", WriteMode::IgnoreVersion, &record()).unwrap();
    batch.delete(b"b", b"v1", WriteMode::RequireSameVersion).unwrap();
    assert_eq!(batch.len(), 2);
    batch.commit().unwrap();

    let requests = transport.requests();
    assert_eq!(
        message_types(&transport),
        vec![
            Some(MessageType::StartBatch),
            Some(MessageType::Put),
            Some(MessageType::Delete),
            Some(MessageType::EndBatch),
        ]
    );
    assert!(requests.iter().all(|r| r.command.header.batch_id == Some(1)));
    match &requests[3].command.body {
        Body::Batch(body) => assert_eq!(body.count, 2),
        other => panic!("Expected batch body, got {:?}", other),
    }
}

#[test]
fn test_batch_abort() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    let mut batch = conn.batch().unwrap();
    batch.put(b"a", b"", WriteMode::IgnoreVersion, &record()).unwrap();
    batch.abort().unwrap();

    assert_eq!(
        message_types(&transport).last().copied().flatten(),
        Some(MessageType::AbortBatch)
    );
}

#[test]
fn test_dropped_batch_is_aborted() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    {
        let mut batch = conn.batch().unwrap();
        batch.put(b"a", b"", WriteMode::IgnoreVersion, &record()).unwrap();
    }

    let requests = transport.requests();
    let abort = requests.last().unwrap();
    assert_eq!(abort.command.message_type(), Some(MessageType::AbortBatch));
    assert_eq!(abort.command.header.batch_id, Some(1));

    // The connection is still usable afterwards
    conn.noop().unwrap();
}

#[test]
fn test_batch_ids_are_unique() {
    let transport = MockTransport::with_handshake();
    transport.respond_ok();
    let mut conn = connect(&transport);

    let first = conn.batch().unwrap();
    assert_eq!(first.id(), BatchId(1));
    first.commit().unwrap();

    let second = conn.batch().unwrap();
    assert_eq!(second.id(), BatchId(2));
    second.abort().unwrap();
}

#[test]
fn test_batch_rejected_by_drive() {
    let transport = MockTransport::with_handshake();
    transport.set_responder(|request| match request.command.message_type() {
        Some(MessageType::EndBatch) => {
            Some(status_frame(request.sequence(), WireStatusCode::InvalidBatch))
        }
        Some(MessageType::StartBatch) => Some(ok_frame(request.sequence())),
        _ => None,
    });
    let mut conn = connect(&transport);

    let mut batch = conn.batch().unwrap();
    batch.delete(b"x", b"", WriteMode::IgnoreVersion).unwrap();
    let status = batch.commit().unwrap_err();
    assert_eq!(status.code(), StatusCode::RemoteInvalidBatch);
}

#[test]
fn test_batch_start_failure() {
    let transport = MockTransport::with_handshake();
    transport.set_responder(|request| Some(status_frame(request.sequence(), WireStatusCode::NotAuthorized)));
    let mut conn = connect(&transport);

    match conn.batch() {
        Err(status) => assert_eq!(status.code(), StatusCode::RemoteNotAuthorized),
        Ok(_) => panic!("Expected batch start to fail"),
    };
}
