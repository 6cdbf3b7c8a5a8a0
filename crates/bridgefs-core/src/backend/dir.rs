// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backend serving a local directory tree.
//!
//! Useful for end-to-end runs without a remote cluster: the mounted
//! filesystem mirrors a directory on the daemon host. Writes go through
//! `O_APPEND` only, so the adapter obeys the same no-in-place-update
//! contract as a remote append-only store.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::{system_time_millis, Backend, FileKind, StorageEntry};
use crate::error::{BackendError, BackendResult};

pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(BackendError::Failed(format!(
                        "path escapes backend root: {path}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    fn entry_from_metadata(name: String, meta: &fs::Metadata) -> StorageEntry {
        let mtime = meta.modified().map(system_time_millis).unwrap_or(0);
        let atime = meta.accessed().map(system_time_millis).unwrap_or(mtime);
        // creation time is not available on every filesystem
        let ctime = meta.created().map(system_time_millis).unwrap_or(mtime);
        StorageEntry {
            name,
            size: meta.len(),
            kind: if meta.is_dir() {
                FileKind::Directory
            } else {
                FileKind::File
            },
            mode: meta.permissions().mode() & 0o7777,
            atime_ms: atime,
            mtime_ms: mtime,
            ctime_ms: ctime,
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

impl Backend for DirBackend {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn stat(&self, path: &str) -> BackendResult<StorageEntry> {
        let resolved = self.resolve(path)?;
        let meta = fs::metadata(&resolved).map_err(|err| BackendError::from(err.kind()))?;
        Ok(Self::entry_from_metadata(Self::file_name(&resolved), &meta))
    }

    fn create(&self, path: &str) -> BackendResult<()> {
        let resolved = self.resolve(path)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved)
            .map_err(|err| BackendError::from(err.kind()))?;
        debug!(path, "created file");
        Ok(())
    }

    fn mkdir(&self, path: &str) -> BackendResult<bool> {
        let resolved = self.resolve(path)?;
        match fs::create_dir(&resolved) {
            Ok(()) => Ok(true),
            // the caller already decided how to report pre-existing paths
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, path: &str) -> BackendResult<bool> {
        let resolved = self.resolve(path)?;
        let meta = match fs::metadata(&resolved) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&resolved)?;
        } else {
            fs::remove_file(&resolved)?;
        }
        Ok(true)
    }

    fn list_dir(&self, path: &str) -> BackendResult<Vec<StorageEntry>> {
        let resolved = self.resolve(path)?;
        let reader = fs::read_dir(&resolved).map_err(|err| BackendError::from(err.kind()))?;
        let mut entries = Vec::new();
        for dirent in reader {
            let dirent = dirent?;
            let meta = dirent.metadata()?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            entries.push(Self::entry_from_metadata(name, &meta));
        }
        Ok(entries)
    }

    fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> BackendResult<usize> {
        let resolved = self.resolve(path)?;
        let mut file =
            fs::File::open(&resolved).map_err(|err| BackendError::from(err.kind()))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let resolved = self.resolve(path)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&resolved)
            .map_err(|err| BackendError::from(err.kind()))?;
        file.write_all(data)?;
        Ok(())
    }
}
