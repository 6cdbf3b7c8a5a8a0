// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! bridgefs core — backend contract, request dispatch, operation handlers
//!
//! The protocol layer in this crate turns one decoded request frame into
//! exactly one response frame, executing the operation against whatever
//! [`Backend`] the daemon was started with. Handlers own the semantic
//! translation onto storage that permits no in-place updates: writes become
//! appends of the not-yet-committed window, creates refuse to truncate
//! existing files, and directory listings are re-encoded into the driver's
//! aligned record format.

pub mod backend;
pub mod error;
mod handlers;
pub mod request;

pub use backend::{Backend, DirBackend, FileKind, MemBackend, StorageEntry};
pub use error::{BackendError, BackendResult};
pub use request::{build_request, Request};
