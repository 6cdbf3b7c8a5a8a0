// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! bridgefs wire protocol — frame layouts and codec
//!
//! This crate defines the binary frames exchanged with the bridgefs kernel
//! driver over its control character device, and the codec that reads and
//! writes them. The layouts mirror the driver's C structs byte for byte;
//! every multi-byte integer travels in the platform's native byte order.
//! The crate performs no I/O and knows nothing about storage backends.

pub mod codec;
pub mod frame;

pub use codec::{decode_request, decode_response_header, encode_request, ResponseBuffer};
pub use frame::{
    dirent_reclen, split_millis, AttrRecord, OpCode, ProtoError, RequestFrame, ResponseHeader,
    ResultCode, ATTR_RECORD_LEN, DEVICE_BUFFER_SIZE, DIRENT_HEADER_LEN, KIND_DIRECTORY,
    KIND_REGULAR, MAX_PASS_LEN, MAX_PATH_LEN, MAX_PAYLOAD, MAX_RESPONSE_PAYLOAD, MAX_SERVER_LEN,
    MAX_USER_LEN, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
