// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One handler per operation kind.
//!
//! Every handler encodes exactly one response header before returning, on
//! success and on failure alike. The only error a handler may bubble up is
//! a [`ProtoError`] from response encoding, which the dispatcher downgrades
//! to an I/O error response.

use bridgefs_proto::{
    split_millis, AttrRecord, ProtoError, ResponseBuffer, ResultCode, ATTR_RECORD_LEN,
    MAX_RESPONSE_PAYLOAD,
};
use tracing::debug;

use crate::backend::Backend;
use crate::error::BackendError;
use crate::request::Request;

/// Create a regular file.
///
/// The backend refuses truncate-on-existing semantics, so a path that
/// already exists is reported as EEXIST without touching storage. A
/// concurrent create that wins the race between our existence check and the
/// create call surfaces as `AlreadyExists` and collapses into the same
/// answer.
pub(crate) fn create(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let path = req.full_path();
    let code = match backend.exists(path) {
        Ok(true) => ResultCode::Exists,
        Ok(false) => match backend.create(path) {
            Ok(()) => ResultCode::Success,
            Err(BackendError::AlreadyExists) => ResultCode::Exists,
            Err(err) => {
                debug!(path, %err, "create failed");
                ResultCode::NotSupported
            }
        },
        Err(err) => {
            debug!(path, %err, "existence check failed");
            ResultCode::IoError
        }
    };
    resp.encode_status(req.op(), code);
    Ok(())
}

/// Create a directory, with the same existence-check-then-create shape as
/// [`create`]. The check and the mkdir are not atomic; two workers racing
/// on the same path settle the winner at the backend.
pub(crate) fn mkdir(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let path = req.full_path();
    let code = match backend.exists(path) {
        Ok(true) => ResultCode::Exists,
        Ok(false) => match backend.mkdir(path) {
            Ok(true) => ResultCode::Success,
            Ok(false) => {
                debug!(path, "backend declined mkdir");
                ResultCode::IoError
            }
            Err(err) => {
                debug!(path, %err, "mkdir failed");
                ResultCode::IoError
            }
        },
        Err(err) => {
            debug!(path, %err, "existence check failed");
            ResultCode::IoError
        }
    };
    resp.encode_status(req.op(), code);
    Ok(())
}

/// Remove a file or directory tree. Remove and Rmdir share this handler;
/// the driver keeps separate request codes but both map onto the backend's
/// recursive delete.
pub(crate) fn remove(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let path = req.full_path();
    let code = match backend.delete(path) {
        Ok(true) => ResultCode::Success,
        Ok(false) => {
            debug!(path, "backend declined delete");
            ResultCode::IoError
        }
        Err(err) => {
            debug!(path, %err, "delete failed");
            ResultCode::IoError
        }
    };
    resp.encode_status(req.op(), code);
    Ok(())
}

pub(crate) fn getattr(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let path = req.full_path();
    match backend.stat(path) {
        Ok(entry) => {
            let (mtime_sec, mtime_nsec) = split_millis(entry.mtime_ms);
            let (atime_sec, atime_nsec) = split_millis(entry.atime_ms);
            let (ctime_sec, ctime_nsec) = split_millis(entry.ctime_ms);
            let attr = AttrRecord {
                mode: entry.mode as u64,
                size: entry.size,
                kind: entry.kind.wire_value(),
                mtime_sec,
                mtime_nsec,
                atime_sec,
                atime_nsec,
                ctime_sec,
                ctime_nsec,
            };
            resp.encode_header(req.op(), ResultCode::Success, ATTR_RECORD_LEN)?;
            resp.put_attr(&attr)?;
        }
        Err(BackendError::NotFound) => resp.encode_status(req.op(), ResultCode::NoEntry),
        Err(err) => {
            debug!(path, %err, "stat failed");
            resp.encode_status(req.op(), ResultCode::IoError);
        }
    }
    Ok(())
}

/// Read file data straight into the response payload region. The driver is
/// handed however many bytes the backend produced; a short read near end of
/// file is the answer, not an error.
pub(crate) fn read(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let frame = req.frame();
    let path = req.full_path();
    let want = (frame.size as usize).min(MAX_RESPONSE_PAYLOAD);
    let window = resp.payload_window(want)?;
    match backend.read(path, frame.offset, window) {
        Ok(count) => {
            debug!(path, offset = frame.offset, want, count, "read");
            resp.encode_header(req.op(), ResultCode::Success, count)?;
        }
        Err(err) => {
            debug!(path, %err, "read failed");
            resp.encode_status(req.op(), ResultCode::NoEntry);
        }
    }
    Ok(())
}

/// List a directory into the driver's aligned record format. The true
/// payload length is only known after encoding, so the header is written
/// last, over the region reserved up front.
pub(crate) fn readdir(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let path = req.full_path();
    match backend.list_dir(path) {
        Ok(entries) => {
            resp.begin_payload();
            for entry in &entries {
                resp.put_dir_entry(entry.name.as_bytes())?;
            }
            let data_len = resp.payload_len();
            debug!(path, entries = entries.len(), data_len, "readdir");
            resp.encode_header(req.op(), ResultCode::Success, data_len)?;
        }
        Err(BackendError::NotFound) => resp.encode_status(req.op(), ResultCode::NoEntry),
        Err(err) => {
            debug!(path, %err, "list failed");
            resp.encode_status(req.op(), ResultCode::IoError);
        }
    }
    Ok(())
}

/// Translate an arbitrary-offset write onto an append-only backend.
///
/// The driver writes page-aligned windows measured from the start of the
/// file, so the incoming payload covers `[offset, offset + size)` and may
/// overlap bytes the backend has already committed:
///
/// ```text
///   |<------------ filesize ------------>|
///   |<---- offset ---->|<----- size ----------->|
///                      |  committed      | new  |
/// ```
///
/// Only the suffix past the current end of file may be appended; a window
/// that ends inside committed data is a true in-place modification and is
/// refused. Getting this slice wrong either drops data or corrupts the
/// append offset, so the arithmetic is validated against the payload
/// bounds.
pub(crate) fn write(
    req: &Request,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), ProtoError> {
    let frame = req.frame();
    let path = req.full_path();

    let entry = match backend.stat(path) {
        Ok(entry) => entry,
        Err(BackendError::NotFound) => {
            resp.encode_status(req.op(), ResultCode::NoEntry);
            return Ok(());
        }
        Err(err) => {
            debug!(path, %err, "stat before write failed");
            resp.encode_status(req.op(), ResultCode::NotSupported);
            return Ok(());
        }
    };
    let filesize = entry.size;

    let code = match write_window(filesize, frame.offset, frame.size, &frame.payload) {
        WriteWindow::InsideCommitted => ResultCode::NotSupported,
        WriteWindow::BadGeometry => ResultCode::InvalidArg,
        WriteWindow::Append(fresh) => match backend.append(path, fresh) {
            Ok(()) => {
                debug!(path, offset = frame.offset, appended = fresh.len(), "write");
                ResultCode::Success
            }
            Err(BackendError::NotFound) => ResultCode::NoEntry,
            Err(err) => {
                debug!(path, %err, "append failed");
                ResultCode::NotSupported
            }
        },
    };
    resp.encode_status(req.op(), code);
    Ok(())
}

enum WriteWindow<'a> {
    /// `[offset, offset + size)` ends before the current end of file.
    InsideCommitted,
    /// The window cannot be reconciled with the payload or the file size.
    BadGeometry,
    /// The not-yet-committed suffix of the payload.
    Append(&'a [u8]),
}

fn write_window(filesize: u64, offset: u64, size: u64, payload: &[u8]) -> WriteWindow<'_> {
    let Some(end) = offset.checked_add(size) else {
        return WriteWindow::BadGeometry;
    };
    if end < filesize {
        return WriteWindow::InsideCommitted;
    }
    if offset > filesize {
        // an append cannot express the hole between EOF and offset
        return WriteWindow::BadGeometry;
    }
    let skip = (filesize - offset) as usize;
    let len = size as usize;
    if len > payload.len() {
        return WriteWindow::BadGeometry;
    }
    WriteWindow::Append(&payload[skip..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileKind, MemBackend, StorageEntry};
    use crate::error::BackendResult;
    use crate::request::build_request;
    use bridgefs_proto::{
        decode_response_header, OpCode, RequestFrame, ResponseHeader, RESPONSE_HEADER_SIZE,
    };

    fn frame(op: OpCode, pathname: &str) -> RequestFrame {
        RequestFrame {
            op: op as i64,
            size: 0,
            offset: 0,
            data_size: 0,
            flags: 0,
            pathname: pathname.to_string(),
            base_path: String::new(),
            server: "storage-1".to_string(),
            username: String::new(),
            password: String::new(),
            payload: Vec::new(),
        }
    }

    fn run(frame: RequestFrame, backend: &dyn Backend) -> (ResponseHeader, Vec<u8>) {
        let req = build_request(frame).unwrap();
        let mut resp = ResponseBuffer::new();
        req.execute(backend, &mut resp);
        let header = decode_response_header(resp.frame()).unwrap();
        let payload = resp.frame()[RESPONSE_HEADER_SIZE..].to_vec();
        assert_eq!(header.data_len as usize, payload.len());
        (header, payload)
    }

    #[test]
    fn create_on_existing_path_is_eexist_and_mutates_nothing() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"keep me");

        let (header, payload) = run(frame(OpCode::Create, "/f"), &backend);
        assert_eq!(header.result, ResultCode::Exists.value());
        assert!(payload.is_empty());
        assert_eq!(backend.file_data("/f").unwrap(), b"keep me");
    }

    #[test]
    fn create_succeeds_on_fresh_path() {
        let backend = MemBackend::new();
        let (header, _) = run(frame(OpCode::Create, "/new"), &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(header.op, OpCode::Create as i64);
        assert!(backend.exists("/new").unwrap());
    }

    /// Backend where every existence check races a concurrent creator.
    struct RacingBackend;

    impl Backend for RacingBackend {
        fn exists(&self, _path: &str) -> BackendResult<bool> {
            Ok(false)
        }
        fn stat(&self, _path: &str) -> BackendResult<StorageEntry> {
            Err(BackendError::NotFound)
        }
        fn create(&self, _path: &str) -> BackendResult<()> {
            Err(BackendError::AlreadyExists)
        }
        fn mkdir(&self, _path: &str) -> BackendResult<bool> {
            Ok(false)
        }
        fn delete(&self, _path: &str) -> BackendResult<bool> {
            Ok(false)
        }
        fn list_dir(&self, _path: &str) -> BackendResult<Vec<StorageEntry>> {
            Err(BackendError::NotFound)
        }
        fn read(&self, _path: &str, _offset: u64, _buf: &mut [u8]) -> BackendResult<usize> {
            Err(BackendError::NotFound)
        }
        fn append(&self, _path: &str, _data: &[u8]) -> BackendResult<()> {
            Err(BackendError::NotFound)
        }
    }

    #[test]
    fn create_race_collapses_to_eexist() {
        let (header, _) = run(frame(OpCode::Create, "/raced"), &RacingBackend);
        assert_eq!(header.result, ResultCode::Exists.value());
    }

    #[test]
    fn mkdir_on_existing_path_is_eexist() {
        let backend = MemBackend::new();
        backend.add_dir("/d");
        let (header, _) = run(frame(OpCode::Mkdir, "/d"), &backend);
        assert_eq!(header.result, ResultCode::Exists.value());
    }

    #[test]
    fn mkdir_backend_decline_is_eio() {
        let (header, _) = run(frame(OpCode::Mkdir, "/d"), &RacingBackend);
        assert_eq!(header.result, ResultCode::IoError.value());
    }

    #[test]
    fn mkdir_succeeds_on_fresh_path() {
        let backend = MemBackend::new();
        let (header, _) = run(frame(OpCode::Mkdir, "/d"), &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert!(backend.exists("/d").unwrap());
    }

    #[test]
    fn remove_missing_path_is_eio() {
        let backend = MemBackend::new();
        let (header, _) = run(frame(OpCode::Remove, "/missing"), &backend);
        assert_eq!(header.result, ResultCode::IoError.value());
    }

    #[test]
    fn rmdir_deletes_recursively() {
        let backend = MemBackend::new();
        backend.add_dir("/d");
        backend.add_file("/d/child", b"x");

        let (header, _) = run(frame(OpCode::Rmdir, "/d"), &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(header.op, OpCode::Rmdir as i64);
        assert!(!backend.exists("/d").unwrap());
        assert!(!backend.exists("/d/child").unwrap());
    }

    #[test]
    fn getattr_missing_is_enoent_with_empty_payload() {
        let backend = MemBackend::new();
        let (header, payload) = run(frame(OpCode::GetAttr, "/missing"), &backend);
        assert_eq!(header.result, ResultCode::NoEntry.value());
        assert!(payload.is_empty());
    }

    #[test]
    fn getattr_returns_72_byte_record_with_split_timestamps() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"hello");
        backend.touch("/f", 1_000_250, 2_000_500, 3_000_750);

        let (header, payload) = run(frame(OpCode::GetAttr, "/f"), &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(header.data_len as usize, ATTR_RECORD_LEN);

        let field = |idx: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&payload[idx * 8..idx * 8 + 8]);
            i64::from_ne_bytes(raw)
        };
        assert_eq!(field(0), 0o644);
        assert_eq!(field(1), 5);
        assert_eq!(field(2), FileKind::File.wire_value());
        assert_eq!((field(3), field(4)), (2_000, 500_000_000)); // mtime
        assert_eq!((field(5), field(6)), (1_000, 250_000_000)); // atime
        assert_eq!((field(7), field(8)), (3_000, 750_000_000)); // ctime
    }

    #[test]
    fn read_honors_backend_short_read() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"hello");

        let mut request = frame(OpCode::Read, "/f");
        request.size = 10;
        let (header, payload) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(header.data_len, 5);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn read_at_offset() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"0123456789");

        let mut request = frame(OpCode::Read, "/f");
        request.size = 4;
        request.offset = 6;
        let (header, payload) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(payload, b"6789");
    }

    #[test]
    fn read_missing_file_is_enoent() {
        let backend = MemBackend::new();
        let mut request = frame(OpCode::Read, "/missing");
        request.size = 16;
        let (header, payload) = run(request, &backend);
        assert_eq!(header.result, ResultCode::NoEntry.value());
        assert!(payload.is_empty());
    }

    #[test]
    fn readdir_emits_aligned_records_in_listing_order() {
        let backend = MemBackend::new();
        backend.add_dir("/d");
        backend.add_file("/d/a", b"");
        backend.add_file("/d/bb", b"");

        let (header, payload) = run(frame(OpCode::ReadDir, "/d"), &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(header.data_len, 32);

        let reclen = |pos: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&payload[pos..pos + 8]);
            i64::from_ne_bytes(raw) as usize
        };
        assert_eq!(reclen(0), 16);
        assert_eq!(&payload[8..10], b"a\0");
        assert_eq!(reclen(16), 16);
        assert_eq!(&payload[24..27], b"bb\0");
    }

    #[test]
    fn readdir_missing_directory_is_enoent() {
        let backend = MemBackend::new();
        let (header, _) = run(frame(OpCode::ReadDir, "/missing"), &backend);
        assert_eq!(header.result, ResultCode::NoEntry.value());
    }

    #[test]
    fn write_appends_exactly_the_uncommitted_suffix() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"12345");

        // page-style window: payload re-sends the committed prefix
        let mut request = frame(OpCode::Write, "/f");
        request.offset = 0;
        request.size = 8;
        request.payload = b"12345XYZ".to_vec();

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(backend.file_data("/f").unwrap(), b"12345XYZ");
    }

    #[test]
    fn write_with_nonzero_offset_window() {
        let backend = MemBackend::new();
        backend.add_file("/f", &[7u8; 4096 + 100]);

        let mut request = frame(OpCode::Write, "/f");
        request.offset = 4096;
        request.size = 200;
        let mut payload = vec![7u8; 100];
        payload.extend_from_slice(&[9u8; 100]);
        request.payload = payload;

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        let data = backend.file_data("/f").unwrap();
        assert_eq!(data.len(), 4096 + 200);
        assert_eq!(&data[4096 + 100..], &[9u8; 100][..]);
    }

    #[test]
    fn write_inside_committed_data_is_enotsup_and_never_appends() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"committed-bytes");

        let mut request = frame(OpCode::Write, "/f");
        request.offset = 0;
        request.size = 4;
        request.payload = b"comX".to_vec();

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::NotSupported.value());
        assert_eq!(backend.file_data("/f").unwrap(), b"committed-bytes");
    }

    #[test]
    fn write_missing_file_is_enoent() {
        let backend = MemBackend::new();
        let mut request = frame(OpCode::Write, "/missing");
        request.size = 4;
        request.payload = b"data".to_vec();
        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::NoEntry.value());
    }

    #[test]
    fn write_window_exactly_at_eof_appends_nothing() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"12345");

        let mut request = frame(OpCode::Write, "/f");
        request.offset = 0;
        request.size = 5;
        request.payload = b"12345".to_vec();

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
        assert_eq!(backend.file_data("/f").unwrap(), b"12345");
    }

    #[test]
    fn write_beyond_eof_hole_is_einval() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"123");

        let mut request = frame(OpCode::Write, "/f");
        request.offset = 4096;
        request.size = 10;
        request.payload = vec![1u8; 10];

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::InvalidArg.value());
        assert_eq!(backend.file_data("/f").unwrap(), b"123");
    }

    #[test]
    fn write_with_truncated_payload_is_einval() {
        let backend = MemBackend::new();
        backend.add_file("/f", b"12");

        let mut request = frame(OpCode::Write, "/f");
        request.offset = 0;
        request.size = 64;
        request.payload = b"1234".to_vec();

        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::InvalidArg.value());
    }

    #[test]
    fn full_path_joins_base_and_pathname() {
        let backend = MemBackend::new();
        backend.add_dir("/export");
        backend.add_file("/export/f", b"x");

        let mut request = frame(OpCode::GetAttr, "/f");
        request.base_path = "/export".to_string();
        let (header, _) = run(request, &backend);
        assert_eq!(header.result, ResultCode::Success.value());
    }

    #[test]
    fn unknown_operation_fails_dispatch_without_response() {
        let mut bad = frame(OpCode::Read, "/f");
        bad.op = 99;
        assert!(matches!(
            build_request(bad),
            Err(ProtoError::UnknownOperation(99))
        ));
    }
}
