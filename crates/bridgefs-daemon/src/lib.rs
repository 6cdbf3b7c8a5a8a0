// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! bridgefs daemon — worker pool over the kernel control device
//!
//! A fixed pool of OS threads services the driver's control device. Each
//! worker owns its own device handle and one reusable response buffer for
//! its whole lifetime, and never talks to the other workers; the only
//! shared state is the backend, which must tolerate concurrent use.
//!
//! Any worker hitting a protocol or device error brings the whole process
//! down: the driver cannot reconcile a half-serviced request, so limping on
//! with the remaining workers would leave filesystem calls hung forever.

pub mod worker;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use bridgefs_core::Backend;
use bridgefs_proto::ResponseBuffer;
use tracing::{error, info, info_span};

pub use worker::WorkerError;

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Path of the control character device.
    pub device: PathBuf,
    /// Number of worker threads, each with its own device handle.
    pub workers: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error("failed to open control device {path}: {source}")]
    OpenDevice { path: PathBuf, source: io::Error },
    #[error("failed to spawn worker thread: {0}")]
    Spawn(io::Error),
    #[error("worker {worker} failed: {source}")]
    WorkerFailed { worker: usize, source: WorkerError },
}

/// Open the device once per worker, run the pool, and block until the first
/// fatal worker error.
///
/// Workers report fatal errors over a channel instead of exiting the
/// process themselves; the caller decides how to die. Workers still blocked
/// in a device read are abandoned: the process is about to exit and the
/// kernel reclaims their handles.
pub fn run(config: &PoolConfig, backend: Arc<dyn Backend>) -> Result<(), DaemonError> {
    info!(device = %config.device.display(), workers = config.workers, "starting worker pool");

    let (fatal_tx, fatal_rx) = mpsc::channel::<(usize, WorkerError)>();

    // Workers are never joined: they either run forever or report a fatal
    // error, after which the process exits.
    let mut handles = Vec::with_capacity(config.workers);

    for idx in 0..config.workers {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|source| DaemonError::OpenDevice {
                path: config.device.clone(),
                source,
            })?;
        let backend = Arc::clone(&backend);
        let fatal_tx = fatal_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("bridgefs-worker-{idx}"))
            .spawn(move || {
                let span = info_span!("worker", idx);
                let _enter = span.enter();
                info!("worker started");

                let mut device = device;
                let mut resp = ResponseBuffer::new();
                if let Err(err) = worker::serve(&mut device, backend.as_ref(), &mut resp) {
                    error!(%err, "worker terminating");
                    let _ = fatal_tx.send((idx, err));
                }
            })
            .map_err(DaemonError::Spawn)?;
        handles.push(handle);
    }
    drop(fatal_tx);

    match fatal_rx.recv() {
        Ok((worker, source)) => Err(DaemonError::WorkerFailed { worker, source }),
        // every worker hung up without reporting: nothing left to supervise
        Err(mpsc::RecvError) => Ok(()),
    }
}
