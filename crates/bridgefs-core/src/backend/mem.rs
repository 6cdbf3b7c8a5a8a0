// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory backend used by the test suites and for standalone runs.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{now_millis, Backend, FileKind, StorageEntry};
use crate::error::{BackendError, BackendResult};

struct Node {
    kind: FileKind,
    data: Vec<u8>,
    mode: u32,
    atime_ms: i64,
    mtime_ms: i64,
    ctime_ms: i64,
}

impl Node {
    fn new(kind: FileKind) -> Self {
        let now = now_millis();
        Self {
            kind,
            data: Vec::new(),
            mode: match kind {
                FileKind::File => 0o644,
                FileKind::Directory => 0o755,
            },
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
        }
    }
}

/// Append-only in-memory tree keyed by full path. Files never shrink and
/// never change committed bytes, matching the contract remote backends are
/// held to.
pub struct MemBackend {
    nodes: Mutex<HashMap<String, Node>>,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBackend {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(FileKind::Directory));
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    /// Seed a regular file, creating or replacing it. Test setup only.
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let mut nodes = self.nodes.lock().unwrap();
        let mut node = Node::new(FileKind::File);
        node.data = data.to_vec();
        nodes.insert(path.to_string(), node);
    }

    /// Seed a directory. Test setup only.
    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(path.to_string(), Node::new(FileKind::Directory));
    }

    /// Pin an entry's timestamps to known values. Test setup only.
    pub fn touch(&self, path: &str, atime_ms: i64, mtime_ms: i64, ctime_ms: i64) {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(path) {
            node.atime_ms = atime_ms;
            node.mtime_ms = mtime_ms;
            node.ctime_ms = ctime_ms;
        }
    }

    /// Raw contents of a seeded file, for assertions.
    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        let nodes = self.nodes.lock().unwrap();
        nodes.get(path).map(|node| node.data.clone())
    }

    fn entry_for(path: &str, node: &Node) -> StorageEntry {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        StorageEntry {
            name,
            size: node.data.len() as u64,
            kind: node.kind,
            mode: node.mode,
            atime_ms: node.atime_ms,
            mtime_ms: node.mtime_ms,
            ctime_ms: node.ctime_ms,
        }
    }
}

impl Backend for MemBackend {
    fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(self.nodes.lock().unwrap().contains_key(path))
    }

    fn stat(&self, path: &str) -> BackendResult<StorageEntry> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(BackendError::NotFound)?;
        Ok(Self::entry_for(path, node))
    }

    fn create(&self, path: &str) -> BackendResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path) {
            return Err(BackendError::AlreadyExists);
        }
        nodes.insert(path.to_string(), Node::new(FileKind::File));
        Ok(())
    }

    fn mkdir(&self, path: &str) -> BackendResult<bool> {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.entry(path.to_string()).or_insert_with(|| Node::new(FileKind::Directory));
        Ok(true)
    }

    fn delete(&self, path: &str) -> BackendResult<bool> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.remove(path).is_none() {
            return Ok(false);
        }
        let prefix = format!("{}/", path);
        nodes.retain(|key, _| !key.starts_with(&prefix));
        Ok(true)
    }

    fn list_dir(&self, path: &str) -> BackendResult<Vec<StorageEntry>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) if node.kind == FileKind::Directory => {}
            Some(_) => return Err(BackendError::Failed("not a directory".to_string())),
            None => return Err(BackendError::NotFound),
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let mut entries: Vec<(&String, &Node)> = nodes
            .iter()
            .filter(|(key, _)| {
                key.as_str() != path
                    && key.starts_with(&prefix)
                    && !key[prefix.len()..].contains('/')
            })
            .collect();
        // HashMap iteration order is arbitrary; fix it so listings are
        // stable across calls the way a real backend's are.
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries.into_iter().map(|(key, node)| Self::entry_for(key, node)).collect())
    }

    fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> BackendResult<usize> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(BackendError::NotFound)?;
        if node.kind != FileKind::File {
            return Err(BackendError::Failed("not a regular file".to_string()));
        }
        let start = offset as usize;
        if start >= node.data.len() {
            return Ok(0);
        }
        let end = (start + buf.len()).min(node.data.len());
        let count = end - start;
        buf[..count].copy_from_slice(&node.data[start..end]);
        Ok(count)
    }

    fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(path).ok_or(BackendError::NotFound)?;
        if node.kind != FileKind::File {
            return Err(BackendError::Failed("not a regular file".to_string()));
        }
        node.data.extend_from_slice(data);
        node.mtime_ms = now_millis();
        Ok(())
    }
}
