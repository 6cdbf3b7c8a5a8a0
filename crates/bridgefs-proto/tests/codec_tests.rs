// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use bridgefs_proto::*;

fn sample_frame(op: OpCode) -> RequestFrame {
    RequestFrame {
        op: op as i64,
        size: 0,
        offset: 0,
        data_size: 0,
        flags: 0,
        pathname: "/docs/report.txt".to_string(),
        base_path: "/export/home".to_string(),
        server: "storage-1.example.com".to_string(),
        username: "svc-bridge".to_string(),
        password: "hunter2".to_string(),
        payload: Vec::new(),
    }
}

#[test]
fn request_round_trip() {
    let frame = sample_frame(OpCode::GetAttr);
    let bytes = encode_request(&frame).unwrap();
    assert_eq!(bytes.len(), REQUEST_HEADER_SIZE);

    let decoded = decode_request(&bytes).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn request_round_trip_with_payload() {
    let mut frame = sample_frame(OpCode::Write);
    frame.size = 11;
    frame.offset = 4096;
    frame.data_size = 11;
    frame.payload = b"hello world".to_vec();

    let bytes = encode_request(&frame).unwrap();
    assert_eq!(bytes.len(), REQUEST_HEADER_SIZE + 11);

    let decoded = decode_request(&bytes).unwrap();
    assert_eq!(decoded, frame);
    assert_eq!(decoded.full_path(), "/export/home/docs/report.txt");
}

#[test]
fn decode_trims_padded_fields() {
    let mut frame = sample_frame(OpCode::Create);
    frame.pathname = "/padded".to_string();
    let bytes = encode_request(&frame).unwrap();
    let decoded = decode_request(&bytes).unwrap();
    assert_eq!(decoded.pathname, "/padded");
    assert_eq!(decoded.username, "svc-bridge");
    assert_eq!(decoded.password, "hunter2");
}

#[test]
fn decode_keeps_unknown_operation_tags() {
    let mut frame = sample_frame(OpCode::Read);
    frame.op = 99;
    let bytes = encode_request(&frame).unwrap();
    // the codec hands the raw tag through; rejecting it is dispatch's job
    let decoded = decode_request(&bytes).unwrap();
    assert_eq!(decoded.op, 99);
}

#[test]
fn decode_rejects_truncated_header() {
    let frame = sample_frame(OpCode::GetAttr);
    let bytes = encode_request(&frame).unwrap();
    for cut in [0, 7, 39, 1000, REQUEST_HEADER_SIZE - 1] {
        assert!(matches!(
            decode_request(&bytes[..cut]),
            Err(ProtoError::MalformedFrame { .. })
        ));
    }
}

#[test]
fn decode_rejects_missing_payload() {
    let mut frame = sample_frame(OpCode::Write);
    frame.size = 64;
    frame.payload = vec![7u8; 64];
    let bytes = encode_request(&frame).unwrap();
    assert!(matches!(
        decode_request(&bytes[..REQUEST_HEADER_SIZE + 10]),
        Err(ProtoError::MalformedFrame { .. })
    ));
}

#[test]
fn decode_rejects_negative_size() {
    let frame = sample_frame(OpCode::Read);
    let mut bytes = encode_request(&frame).unwrap();
    bytes[8..16].copy_from_slice(&(-1i64).to_ne_bytes());
    assert!(matches!(
        decode_request(&bytes),
        Err(ProtoError::NegativeField { field: "size", .. })
    ));
}

#[test]
fn decode_caps_payload_at_buffer_capacity() {
    let mut frame = sample_frame(OpCode::Write);
    // the driver can never deliver more than the device buffer holds
    frame.size = (DEVICE_BUFFER_SIZE * 2) as u64;
    frame.payload = vec![1u8; MAX_PAYLOAD];
    let bytes = encode_request(&frame).unwrap();
    let decoded = decode_request(&bytes).unwrap();
    assert_eq!(decoded.payload.len(), MAX_PAYLOAD);
}

#[test]
fn response_header_layout() {
    let mut resp = ResponseBuffer::new();
    resp.encode_header(OpCode::Read, ResultCode::Success, 5).unwrap();
    resp.put_bytes(b"abcde").unwrap();

    let frame = resp.frame();
    assert_eq!(frame.len(), RESPONSE_HEADER_SIZE + 5);

    let header = decode_response_header(frame).unwrap();
    assert_eq!(header.op, OpCode::Read as i64);
    assert_eq!(header.result, 0);
    assert_eq!(header.data_len, 5);
    assert_eq!(&frame[RESPONSE_HEADER_SIZE..], b"abcde");
}

#[test]
fn result_codes_match_driver_abi() {
    assert_eq!(ResultCode::Success.value(), 0);
    assert_eq!(ResultCode::NoEntry.value(), 2);
    assert_eq!(ResultCode::IoError.value(), 5);
    assert_eq!(ResultCode::Exists.value(), 17);
    assert_eq!(ResultCode::InvalidArg.value(), 22);
    assert_eq!(ResultCode::NotSupported.value(), 48);
}

#[test]
fn dir_entries_encode_in_order_with_aligned_records() {
    let mut resp = ResponseBuffer::new();
    resp.begin_payload();
    for name in ["a", "bb", "seven77"] {
        resp.put_dir_entry(name.as_bytes()).unwrap();
    }
    let len = resp.payload_len();
    resp.encode_header(OpCode::ReadDir, ResultCode::Success, len).unwrap();

    let payload = &resp.frame()[RESPONSE_HEADER_SIZE..];
    assert_eq!(len, 16 + 16 + 16);

    let mut pos = 0;
    for name in ["a", "bb", "seven77"] {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&payload[pos..pos + 8]);
        let reclen = i64::from_ne_bytes(raw) as usize;
        assert_eq!(reclen % 8, 0);
        assert!(reclen >= DIRENT_HEADER_LEN + name.len() + 1);
        let name_bytes = &payload[pos + 8..pos + 8 + name.len()];
        assert_eq!(name_bytes, name.as_bytes());
        assert_eq!(payload[pos + 8 + name.len()], 0);
        pos += reclen;
    }
    assert_eq!(pos, len);
}

#[test]
fn attr_record_is_72_bytes_of_i64_fields() {
    let (mtime_sec, mtime_nsec) = split_millis(1_700_000_123_456);
    let attr = AttrRecord {
        mode: 0o644,
        size: 4096,
        kind: KIND_REGULAR,
        mtime_sec,
        mtime_nsec,
        atime_sec: 7,
        atime_nsec: 0,
        ctime_sec: 9,
        ctime_nsec: 0,
    };

    let mut resp = ResponseBuffer::new();
    resp.encode_header(OpCode::GetAttr, ResultCode::Success, ATTR_RECORD_LEN).unwrap();
    resp.put_attr(&attr).unwrap();

    let frame = resp.frame();
    assert_eq!(frame.len(), RESPONSE_HEADER_SIZE + ATTR_RECORD_LEN);

    let field = |idx: usize| {
        let start = RESPONSE_HEADER_SIZE + idx * 8;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&frame[start..start + 8]);
        i64::from_ne_bytes(raw)
    };
    assert_eq!(field(0), 0o644);
    assert_eq!(field(1), 4096);
    assert_eq!(field(2), KIND_REGULAR);
    assert_eq!(field(3), 1_700_000_123);
    assert_eq!(field(4), 456_000_000);
    assert_eq!(field(5), 7);
    assert_eq!(field(8), 0);
}
