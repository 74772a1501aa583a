//! Codec Tests
//!
//! Tests for frame encoding and the resumable frame reader/writer.

#[path = "../common/mod.rs"]
mod common;

use bytes::Bytes;
use common::MockTransport;
use kinetic::protocol::{
    check_frame_lengths, encode_frame, DecodeStatus, EncodeStatus, FrameError, FrameReader,
    FrameWriter, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE,
};

fn read_until_done(reader: &mut FrameReader, transport: &mut MockTransport) -> DecodeStatus {
    for _ in 0..10_000 {
        match reader.read(transport) {
            DecodeStatus::InProgress => continue,
            other => return other,
        }
    }
    panic!("frame never completed");
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_layout() {
    let frame = encode_frame(b"cmd", b"value");

    assert_eq!(frame.len(), HEADER_SIZE + 3 + 5);
    assert_eq!(frame[0], MAGIC);
    assert_eq!(&frame[1..5], &3u32.to_be_bytes());
    assert_eq!(&frame[5..9], &5u32.to_be_bytes());
    assert_eq!(&frame[9..12], b"cmd");
    assert_eq!(&frame[12..], b"value");
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_frame_length_limits() {
    assert!(check_frame_lengths(0, 0).is_ok());
    assert!(check_frame_lengths(MAX_PAYLOAD_SIZE, MAX_PAYLOAD_SIZE).is_ok());

    match check_frame_lengths(16, MAX_PAYLOAD_SIZE + 1) {
        Err(FrameError::PayloadTooLarge { what, len }) => {
            assert_eq!(what, "value");
            assert_eq!(len, MAX_PAYLOAD_SIZE + 1);
        }
        other => panic!("Expected oversized value, got {:?}", other),
    }
    assert!(matches!(
        check_frame_lengths(MAX_PAYLOAD_SIZE + 1, 0),
        Err(FrameError::PayloadTooLarge { what: "command", .. })
    ));
}

#[test]
fn test_encode_empty_value() {
    let frame = encode_frame(b"abc", b"");
    assert_eq!(frame.len(), HEADER_SIZE + 3);
    assert_eq!(&frame[5..9], &[0, 0, 0, 0]);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_read_complete_frame() {
    let mut transport = MockTransport::new();
    transport.push(&encode_frame(b"command", b"value"));

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    match reader.read(&mut transport) {
        DecodeStatus::Done(frame) => {
            assert_eq!(frame.command, Bytes::from_static(b"command"));
            assert_eq!(frame.value, Bytes::from_static(b"value"));
        }
        other => panic!("Expected complete frame, got {:?}", other),
    }
    assert!(!reader.in_progress());
}

#[test]
fn test_read_byte_at_a_time() {
    let mut transport = MockTransport::new();
    transport.set_read_chunk(1);
    transport.push(&encode_frame(b"command", b"some value bytes"));

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    match read_until_done(&mut reader, &mut transport) {
        DecodeStatus::Done(frame) => {
            assert_eq!(&frame.command[..], b"command");
            assert_eq!(&frame.value[..], b"some value bytes");
        }
        other => panic!("Expected complete frame, got {:?}", other),
    }
}

#[test]
fn test_partial_frame_resumes() {
    let frame = encode_frame(b"command", b"value");
    let mut transport = MockTransport::new();
    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);

    // Header and half the command
    transport.push(&frame[..HEADER_SIZE + 3]);
    assert!(matches!(reader.read(&mut transport), DecodeStatus::InProgress));
    assert!(reader.in_progress());

    // Nothing new: still in progress, nothing lost
    assert!(matches!(reader.read(&mut transport), DecodeStatus::InProgress));

    transport.push(&frame[HEADER_SIZE + 3..]);
    match reader.read(&mut transport) {
        DecodeStatus::Done(raw) => {
            assert_eq!(&raw.command[..], b"command");
            assert_eq!(&raw.value[..], b"value");
        }
        other => panic!("Expected complete frame, got {:?}", other),
    }
}

#[test]
fn test_empty_transport_is_in_progress() {
    let mut transport = MockTransport::new();
    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);

    assert!(matches!(reader.read(&mut transport), DecodeStatus::InProgress));
    assert!(!reader.in_progress());
}

#[test]
fn test_back_to_back_frames() {
    let mut transport = MockTransport::new();
    transport.push(&encode_frame(b"one", b""));
    transport.push(&encode_frame(b"two", b"2"));

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    let first = match reader.read(&mut transport) {
        DecodeStatus::Done(frame) => frame,
        other => panic!("Expected frame, got {:?}", other),
    };
    let second = match reader.read(&mut transport) {
        DecodeStatus::Done(frame) => frame,
        other => panic!("Expected frame, got {:?}", other),
    };

    assert_eq!(&first.command[..], b"one");
    assert!(first.value.is_empty());
    assert_eq!(&second.command[..], b"two");
    assert_eq!(&second.value[..], b"2");
}

#[test]
fn test_invalid_magic() {
    let mut transport = MockTransport::new();
    let mut frame = encode_frame(b"cmd", b"").to_vec();
    frame[0] = b'X';
    transport.push(&frame);

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    match reader.read(&mut transport) {
        DecodeStatus::Failed(FrameError::InvalidMagic(byte)) => assert_eq!(byte, b'X'),
        other => panic!("Expected invalid magic, got {:?}", other),
    }
}

#[test]
fn test_eof_mid_frame_fails() {
    let mut transport = MockTransport::new();
    let frame = encode_frame(b"command", b"value");
    transport.push(&frame[..frame.len() - 2]);
    transport.close();

    let mut reader = FrameReader::new(DEFAULT_MAX_FRAME_SIZE);
    assert!(matches!(
        reader.read(&mut transport),
        DecodeStatus::Failed(FrameError::Io(_))
    ));
}

#[test]
fn test_too_large_value_keeps_command() {
    let mut transport = MockTransport::new();
    transport.push(&encode_frame(b"command", &[7u8; 100]));
    transport.push(&encode_frame(b"next", b"ok"));

    let mut reader = FrameReader::new(50);
    match read_until_done(&mut reader, &mut transport) {
        DecodeStatus::TooLarge {
            command,
            command_len,
            value_len,
        } => {
            assert_eq!(command.as_deref(), Some(&b"command"[..]));
            assert_eq!(command_len, 7);
            assert_eq!(value_len, 100);
        }
        other => panic!("Expected too large, got {:?}", other),
    }

    // The stream stays in sync
    match reader.read(&mut transport) {
        DecodeStatus::Done(frame) => {
            assert_eq!(&frame.command[..], b"next");
            assert_eq!(&frame.value[..], b"ok");
        }
        other => panic!("Expected next frame, got {:?}", other),
    }
}

#[test]
fn test_too_large_command_discards_everything() {
    let mut transport = MockTransport::new();
    transport.set_read_chunk(13);
    transport.push(&encode_frame(&[1u8; 64], &[2u8; 10]));
    transport.push(&encode_frame(b"next", b""));

    let mut reader = FrameReader::new(32);
    match read_until_done(&mut reader, &mut transport) {
        DecodeStatus::TooLarge { command, .. } => assert!(command.is_none()),
        other => panic!("Expected too large, got {:?}", other),
    }

    match read_until_done(&mut reader, &mut transport) {
        DecodeStatus::Done(frame) => assert_eq!(&frame.command[..], b"next"),
        other => panic!("Expected next frame, got {:?}", other),
    }
}

#[test]
fn test_length_boundaries() {
    const MAX: usize = 32;

    // (command length, value length, fits)
    let cases = [
        (0, 0, true),
        (1, 0, true),
        (0, 1, true),
        (1, 1, true),
        (MAX, 0, true),
        (0, MAX, true),
        (20, 12, true),
        (MAX + 1, 0, false),
        (0, MAX + 1, false),
        (20, 13, false),
    ];

    for (command_len, value_len, fits) in cases {
        let command = vec![0xc1u8; command_len];
        let value = vec![0x5au8; value_len];
        let mut transport = MockTransport::new();
        transport.push(&encode_frame(&command, &value));
        transport.push(&encode_frame(b"next", b""));

        let mut reader = FrameReader::new(MAX);
        match (read_until_done(&mut reader, &mut transport), fits) {
            (DecodeStatus::Done(frame), true) => {
                assert_eq!(&frame.command[..], &command[..], "C={} V={}", command_len, value_len);
                assert_eq!(&frame.value[..], &value[..], "C={} V={}", command_len, value_len);
            }
            (DecodeStatus::TooLarge { command: kept, command_len: c, value_len: v }, false) => {
                assert_eq!((c as usize, v as usize), (command_len, value_len));
                let expected = (command_len <= MAX).then(|| command.clone());
                assert_eq!(kept.map(|b| b.to_vec()), expected, "C={} V={}", command_len, value_len);
            }
            (other, _) => panic!("C={} V={}: unexpected {:?}", command_len, value_len, other),
        }

        match read_until_done(&mut reader, &mut transport) {
            DecodeStatus::Done(frame) => assert_eq!(&frame.command[..], b"next"),
            other => panic!("C={} V={}: lost sync, got {:?}", command_len, value_len, other),
        }
    }
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_completes() {
    let mut transport = MockTransport::new();
    let frame = encode_frame(b"cmd", b"val");
    let mut writer = FrameWriter::new(frame.clone());

    assert!(matches!(writer.write(&mut transport), EncodeStatus::Done));
    assert_eq!(writer.remaining(), 0);
    assert_eq!(transport.written_len(), frame.len());
}

#[test]
fn test_writer_resumes_after_would_block() {
    let mut transport = MockTransport::new();
    transport.set_write_budget(Some(4));

    let frame = encode_frame(b"command", b"value");
    let mut writer = FrameWriter::new(frame.clone());

    assert!(matches!(writer.write(&mut transport), EncodeStatus::InProgress));
    assert_eq!(writer.remaining(), frame.len() - 4);

    transport.set_write_budget(None);
    assert!(matches!(writer.write(&mut transport), EncodeStatus::Done));
    assert_eq!(transport.written_len(), frame.len());
}

#[test]
fn test_writer_failure() {
    let mut transport = MockTransport::new();
    transport.fail_writes();

    let mut writer = FrameWriter::new(encode_frame(b"cmd", b""));
    assert!(matches!(writer.write(&mut transport), EncodeStatus::Failed(_)));
}
