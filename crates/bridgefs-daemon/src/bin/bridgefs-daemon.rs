// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! bridgefs daemon binary.
//!
//! Bridges the bridgefs kernel driver's control device to a storage
//! backend: reads request frames, executes them, writes response frames.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bridgefs_core::{Backend, DirBackend, MemBackend};
use bridgefs_daemon::{run, PoolConfig, DEFAULT_WORKERS};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bridgefs-daemon", about = "Userspace daemon for the bridgefs driver")]
struct Args {
    /// Control device to service
    #[arg(long, default_value = "/dev/bridgefsctl")]
    device: PathBuf,

    /// Number of worker threads polling the device
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Storage backend to serve
    #[arg(long, value_enum, default_value_t = BackendKind::Dir)]
    backend: BackendKind,

    /// Root directory served by the dir backend
    #[arg(long)]
    root: Option<PathBuf>,

    /// Configuration file (JSON); values set there win over flags
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BackendKind {
    /// In-memory tree, useful for smoke tests
    Memory,
    /// Serve a directory on the local filesystem
    Dir,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Dir => write!(f, "dir"),
        }
    }
}

/// Optional file-based configuration mirroring the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DaemonConfig {
    device: Option<PathBuf>,
    workers: Option<usize>,
    backend: Option<BackendKind>,
    root: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<DaemonConfig> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: DaemonConfig = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(DaemonConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let file_config = load_config(args.config.as_ref())?;

    let device = file_config.device.unwrap_or(args.device);
    let workers = file_config.workers.unwrap_or(args.workers);
    let backend_kind = file_config.backend.unwrap_or(args.backend);
    let root = file_config.root.or(args.root);

    if workers == 0 {
        bail!("worker count must be at least 1");
    }

    let backend: Arc<dyn Backend> = match backend_kind {
        BackendKind::Memory => {
            info!("serving in-memory backend");
            Arc::new(MemBackend::new())
        }
        BackendKind::Dir => {
            let root = root.context("--root is required for the dir backend")?;
            info!(root = %root.display(), "serving local directory backend");
            Arc::new(DirBackend::new(root))
        }
    };

    let config = PoolConfig { device, workers };
    run(&config, backend).context("daemon terminated")
}
