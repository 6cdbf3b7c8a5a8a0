// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Typed requests and the operation dispatcher.

use bridgefs_proto::{OpCode, ProtoError, RequestFrame, ResponseBuffer, ResultCode};
use tracing::warn;

use crate::backend::Backend;
use crate::handlers;

/// One in-flight operation: the decoded frame plus the resolved backend
/// path. Built per frame, executed once, then dropped; never shared across
/// operations or threads.
pub struct Request {
    op: OpCode,
    frame: RequestFrame,
    full_path: String,
}

/// Map a decoded frame onto its typed request. Fails with
/// [`ProtoError::UnknownOperation`] for tags the protocol does not define;
/// the worker treats that as fatal without producing a response, since a
/// driver sending unknown codes cannot be trusted about the rest of the
/// frame either.
pub fn build_request(frame: RequestFrame) -> Result<Request, ProtoError> {
    let op = OpCode::try_from(frame.op)?;
    let full_path = frame.full_path();
    Ok(Request {
        op,
        frame,
        full_path,
    })
}

impl Request {
    pub fn op(&self) -> OpCode {
        self.op
    }

    pub fn frame(&self) -> &RequestFrame {
        &self.frame
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Run the operation against `backend`, leaving exactly one encoded
    /// response in `resp` on every path. Domain failures become result
    /// codes; an encoding failure (a payload that cannot fit the device
    /// buffer) is downgraded to an I/O error response so the driver still
    /// hears back.
    pub fn execute(&self, backend: &dyn Backend, resp: &mut ResponseBuffer) {
        let outcome = match self.op {
            OpCode::Read => handlers::read(self, backend, resp),
            OpCode::ReadDir => handlers::readdir(self, backend, resp),
            OpCode::GetAttr => handlers::getattr(self, backend, resp),
            OpCode::Write => handlers::write(self, backend, resp),
            OpCode::Create => handlers::create(self, backend, resp),
            OpCode::Remove | OpCode::Rmdir => handlers::remove(self, backend, resp),
            OpCode::Mkdir => handlers::mkdir(self, backend, resp),
        };
        if let Err(err) = outcome {
            warn!(op = %self.op, path = %self.full_path, %err, "response encoding failed");
            resp.encode_status(self.op, ResultCode::IoError);
        }
    }
}
