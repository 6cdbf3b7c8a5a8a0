// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The per-worker device loop.

use std::io::{self, Read, Write};

use bridgefs_core::{build_request, Backend};
use bridgefs_proto::{
    decode_request, ProtoError, ResponseBuffer, DEVICE_BUFFER_SIZE, REQUEST_HEADER_SIZE,
};
use tracing::{debug, trace};

/// Failures that end a worker. Every variant is process-fatal: a request the
/// daemon cannot parse, or a device channel it cannot read or write, leaves
/// the driver with a queued request that can never be answered.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("device i/o failed: {0}")]
    Device(#[from] io::Error),
    #[error("device returned a short frame of {got} bytes")]
    ShortFrame { got: usize },
    #[error(transparent)]
    Protocol(#[from] ProtoError),
}

/// Service the device until a fatal error.
///
/// One iteration: block on a device read for the next request frame, decode
/// it, dispatch to the matching handler, write the encoded response back.
/// The read is the only place a worker waits under normal load; the driver
/// parks the read until a request is queued. Domain failures are already
/// result codes inside the response by the time execution returns, so the
/// loop itself only fails on protocol or device errors.
///
/// Generic over the transport so tests can script a device; production
/// hands in the character-device `File`.
pub fn serve<D: Read + Write>(
    device: &mut D,
    backend: &dyn Backend,
    resp: &mut ResponseBuffer,
) -> Result<(), WorkerError> {
    let mut rbuf = vec![0u8; DEVICE_BUFFER_SIZE];
    loop {
        let len = device.read(&mut rbuf)?;
        if len == 0 {
            return Err(WorkerError::Device(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control device closed",
            )));
        }
        if len < REQUEST_HEADER_SIZE {
            return Err(WorkerError::ShortFrame { got: len });
        }
        trace!(len, "frame read from device");

        // Decode over the whole buffer, not just this read: for operations
        // like Read the driver sends `size` with no trailing payload, and
        // the payload region is simply not meaningful.
        let frame = decode_request(&rbuf)?;
        let request = build_request(frame)?;
        debug!(op = %request.op(), path = request.full_path(), "servicing request");

        request.execute(backend, resp);
        device.write_all(resp.frame())?;
        trace!(bytes = resp.frame().len(), "response written");
    }
}
