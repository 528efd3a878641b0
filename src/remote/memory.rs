//! In-memory remote tree
//!
//! A `RemoteTree` backed by a map of paths, used by the test suite and
//! benches to exercise the indexer and the random image service without
//! an SSH server. Paths can be made to fail on listing or opening, and
//! call counters make it possible to assert that no remote I/O happened.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::types::{normalize_path, parent_path, EntryType, RemoteEntry};
use crate::remote::{RemoteReader, RemoteTree};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { bytes: Vec<u8>, mtime: Option<i64> },
    Symlink,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    failing_lists: HashSet<String>,
    failing_opens: HashSet<String>,
    broken_sessions: HashSet<String>,
}

/// Thread-safe in-memory directory tree
pub struct MemoryTree {
    inner: RwLock<Inner>,
    list_calls: AtomicU64,
    open_calls: AtomicU64,
}

impl MemoryTree {
    /// Create a tree containing only "/"
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert("/".to_string(), Node::Dir);
        Self {
            inner: RwLock::new(inner),
            list_calls: AtomicU64::new(0),
            open_calls: AtomicU64::new(0),
        }
    }

    /// Add a directory, creating missing parents
    pub fn add_dir(&self, path: &str) -> &Self {
        let path = normalize_path(path);
        let mut inner = self.inner.write();
        ensure_parents(&mut inner.nodes, &path);
        inner.nodes.insert(path, Node::Dir);
        self
    }

    /// Add a file with no modification time
    pub fn add_file(&self, path: &str, bytes: impl Into<Vec<u8>>) -> &Self {
        self.add_file_with_mtime(path, bytes, None)
    }

    /// Add a file, creating missing parents
    pub fn add_file_with_mtime(
        &self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        mtime: Option<i64>,
    ) -> &Self {
        let path = normalize_path(path);
        let mut inner = self.inner.write();
        ensure_parents(&mut inner.nodes, &path);
        inner.nodes.insert(
            path,
            Node::File {
                bytes: bytes.into(),
                mtime,
            },
        );
        self
    }

    /// Add a symbolic link entry (its target is irrelevant here)
    pub fn add_symlink(&self, path: &str) -> &Self {
        let path = normalize_path(path);
        let mut inner = self.inner.write();
        ensure_parents(&mut inner.nodes, &path);
        inner.nodes.insert(path, Node::Symlink);
        self
    }

    /// Remove a path and everything below it
    pub fn remove(&self, path: &str) {
        let path = normalize_path(path);
        let prefix = format!("{}/", path);
        let mut inner = self.inner.write();
        inner
            .nodes
            .retain(|key, _| key != &path && !key.starts_with(&prefix));
    }

    /// Make every listing of `path` fail
    pub fn fail_listing(&self, path: &str) -> &Self {
        self.inner.write().failing_lists.insert(normalize_path(path));
        self
    }

    /// Make listing `path` fail as if the SSH session had dropped
    pub fn break_session_at(&self, path: &str) -> &Self {
        self.inner.write().broken_sessions.insert(normalize_path(path));
        self
    }

    /// Make every open of `path` fail
    pub fn fail_open(&self, path: &str) -> &Self {
        self.inner.write().failing_opens.insert(normalize_path(path));
        self
    }

    /// Number of `list_dir` calls so far
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of `open_read` calls so far
    pub fn open_calls(&self) -> u64 {
        self.open_calls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = parent_path(path);
    while let Some(dir) = current {
        nodes.entry(dir.to_string()).or_insert(Node::Dir);
        current = parent_path(dir);
    }
}

impl RemoteTree for MemoryTree {
    fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let path = normalize_path(path);
        let inner = self.inner.read();

        if inner.broken_sessions.contains(&path) {
            return Err(RemoteError::SessionFailed {
                server: "memory".into(),
                reason: format!("session dropped while listing '{}'", path),
            });
        }

        if inner.failing_lists.contains(&path) {
            return Err(RemoteError::ReadDirFailed {
                path,
                reason: "injected listing failure".into(),
            });
        }

        match inner.nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(RemoteError::ReadDirFailed {
                    path,
                    reason: "not a directory".into(),
                })
            }
            None => return Err(RemoteError::NotFound { path }),
        }

        let entries = inner
            .nodes
            .iter()
            .filter(|(key, _)| key.as_str() != path && parent_path(key) == Some(path.as_str()))
            .map(|(key, node)| {
                let name = key.rsplit('/').next().unwrap_or(key).to_string();
                match node {
                    Node::Dir => RemoteEntry::dir(name),
                    Node::File { bytes, mtime } => {
                        RemoteEntry::file(name, bytes.len() as u64, *mtime)
                    }
                    Node::Symlink => RemoteEntry {
                        name,
                        entry_type: EntryType::Symlink,
                        size: 0,
                        mtime: None,
                    },
                }
            })
            .collect();

        Ok(entries)
    }

    fn open_read(&self, path: &str) -> RemoteResult<RemoteReader> {
        self.open_calls.fetch_add(1, Ordering::Relaxed);
        let path = normalize_path(path);
        let inner = self.inner.read();

        if inner.failing_opens.contains(&path) {
            return Err(RemoteError::OpenFailed {
                path,
                reason: "injected open failure".into(),
            });
        }

        match inner.nodes.get(&path) {
            Some(Node::File { bytes, .. }) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Some(_) => Err(RemoteError::OpenFailed {
                path,
                reason: "not a regular file".into(),
            }),
            None => Err(RemoteError::NotFound { path }),
        }
    }

    fn describe(&self) -> String {
        format!("memory ({} nodes)", self.inner.read().nodes.len())
    }
}
