// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Frame layouts shared with the kernel driver.
//!
//! The request and response structs below are fixed by the driver ABI: all
//! fields are 8-byte aligned, string fields are fixed-width padded byte
//! arrays, and the result codes carry the numeric values the driver was
//! built against (they are not host errno values).

/// Width of the fixed-size username field.
pub const MAX_USER_LEN: usize = 40;
/// Width of the fixed-size password field.
pub const MAX_PASS_LEN: usize = 40;
/// Width of the fixed-size server field.
pub const MAX_SERVER_LEN: usize = 80;
/// Width of the pathname and base-path fields.
pub const MAX_PATH_LEN: usize = 1024;

/// Size of the driver's per-instance transfer buffer. One device read yields
/// at most this many bytes, and one response frame may not exceed it.
pub const DEVICE_BUFFER_SIZE: usize = 1024 * 1024;

/// Fixed prefix of every request frame: five i64 fields plus the padded
/// string fields.
pub const REQUEST_HEADER_SIZE: usize = 8 * 5 + MAX_PATH_LEN * 2 + MAX_SERVER_LEN + MAX_USER_LEN + MAX_PASS_LEN;

/// Response header: operation, result, data length (one i64 each).
pub const RESPONSE_HEADER_SIZE: usize = 24;

/// Upper bound on the payload trailing a request frame.
pub const MAX_PAYLOAD: usize = DEVICE_BUFFER_SIZE - REQUEST_HEADER_SIZE;

/// Upper bound on the payload trailing a response header.
pub const MAX_RESPONSE_PAYLOAD: usize = DEVICE_BUFFER_SIZE - RESPONSE_HEADER_SIZE;

/// Byte length of the attribute record returned for GetAttr: nine i64 fields.
pub const ATTR_RECORD_LEN: usize = 72;

/// Each directory entry record starts with its own i64 record length.
pub const DIRENT_HEADER_LEN: usize = 8;

/// File type value for regular files in the attribute record.
pub const KIND_REGULAR: i64 = 1;
/// File type value for directories in the attribute record.
pub const KIND_DIRECTORY: i64 = 2;

/// Errors raised while encoding or decoding frames. All of these poison the
/// device channel and are treated as fatal by the worker loop.
#[derive(thiserror::Error, Debug)]
pub enum ProtoError {
    /// The device handed over fewer bytes than the frame layout requires.
    #[error("malformed frame: need {needed} bytes at offset {at}, {remaining} remaining")]
    MalformedFrame {
        at: usize,
        needed: usize,
        remaining: usize,
    },
    /// A header integer field that must be non-negative was negative.
    #[error("negative field {field} in request header: {value}")]
    NegativeField { field: &'static str, value: i64 },
    /// The operation tag does not name any known request kind.
    #[error("unknown operation code {0}")]
    UnknownOperation(i64),
    /// A response payload would not fit the device buffer.
    #[error("response payload overflow: {requested} bytes exceeds capacity {capacity}")]
    Overflow { requested: usize, capacity: usize },
}

/// Operation tags understood by the dispatcher. Values are the driver's
/// request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum OpCode {
    Read = 1,
    ReadDir = 2,
    GetAttr = 3,
    Write = 4,
    Create = 5,
    Remove = 6,
    Mkdir = 7,
    Rmdir = 8,
}

impl TryFrom<i64> for OpCode {
    type Error = ProtoError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        use OpCode::*;
        Ok(match value {
            1 => Read,
            2 => ReadDir,
            3 => GetAttr,
            4 => Write,
            5 => Create,
            6 => Remove,
            7 => Mkdir,
            8 => Rmdir,
            other => return Err(ProtoError::UnknownOperation(other)),
        })
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpCode::Read => "read",
            OpCode::ReadDir => "readdir",
            OpCode::GetAttr => "getattr",
            OpCode::Write => "write",
            OpCode::Create => "create",
            OpCode::Remove => "remove",
            OpCode::Mkdir => "mkdir",
            OpCode::Rmdir => "rmdir",
        };
        f.write_str(name)
    }
}

/// Status values written into the response header. The numeric values are
/// part of the driver ABI; in particular `NotSupported` is 48 regardless of
/// what the host libc calls ENOTSUP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ResultCode {
    Success = 0,
    NoEntry = 2,
    IoError = 5,
    Exists = 17,
    InvalidArg = 22,
    NotSupported = 48,
}

impl ResultCode {
    /// Wire representation of the code.
    pub fn value(self) -> i64 {
        self as i64
    }
}

/// One decoded request frame. Immutable once parsed; string fields have had
/// their fixed-width padding trimmed.
///
/// `op` stays a raw tag here: validating it against the known operations is
/// the dispatcher's job, so an unknown code still decodes into a frame that
/// can be inspected and logged before the worker gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub op: i64,
    pub size: u64,
    pub offset: u64,
    pub data_size: u64,
    pub flags: u64,
    pub pathname: String,
    pub base_path: String,
    pub server: String,
    pub username: String,
    pub password: String,
    /// Trailing request payload; present only when `size > 0`, capped at
    /// [`MAX_PAYLOAD`].
    pub payload: Vec<u8>,
}

impl RequestFrame {
    /// The path the operation targets on the backend: mount base path
    /// concatenated with the in-filesystem pathname.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.base_path, self.pathname)
    }
}

/// Decoded response header, as seen by the test tooling and exerciser
/// clients that parse daemon output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub op: i64,
    pub result: i64,
    pub data_len: i64,
}

/// The nine-field attribute record answering a GetAttr request.
///
/// Timestamps are second/nanosecond pairs; [`split_millis`] converts from
/// the millisecond resolution storage backends report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRecord {
    pub mode: u64,
    pub size: u64,
    pub kind: i64,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub atime_sec: i64,
    pub atime_nsec: i64,
    pub ctime_sec: i64,
    pub ctime_nsec: i64,
}

/// Split a millisecond timestamp into the (seconds, nanoseconds) pair the
/// attribute record carries.
pub fn split_millis(ms: i64) -> (i64, i64) {
    (ms / 1000, (ms % 1000) * 1_000_000)
}

/// Record length of a directory entry for a name of `name_len` bytes
/// (terminator excluded): the smallest multiple of 8 that holds the length
/// field, the name and its NUL terminator.
pub fn dirent_reclen(name_len: usize) -> usize {
    (DIRENT_HEADER_LEN + name_len + 1 + 7) & !7
}
