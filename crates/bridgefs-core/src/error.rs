// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for backend adapters.

use std::io;

/// Domain errors a storage backend reports to the protocol layer. Anything
/// a handler does not map explicitly is answered as an I/O error so the
/// driver always receives a response.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("unsupported")]
    Unsupported,
    #[error("backend failure: {0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;
