//! Image-bearing directory index
//!
//! The index is built in two phases. During the startup walk, directories
//! are appended to an `IndexBuilder` under a mutex, so any number of walk
//! workers can write to it. `freeze()` consumes the builder and publishes
//! an immutable `ImageIndex` snapshot that request handlers read without
//! taking any lock.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

/// Immutable list of remote directories that directly contain an image
///
/// Cloning is cheap (reference-counted). Order is discovery order.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    dirs: Arc<[String]>,
}

impl ImageIndex {
    /// Build an index directly from a list of directories
    pub fn from_dirs(dirs: Vec<String>) -> Self {
        Self { dirs: dirs.into() }
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Directories in discovery order
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Pick one directory uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.dirs.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.dirs.len());
        Some(self.dirs[idx].as_str())
    }
}

/// Append-only collector used while the walk is running
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dirs: Mutex<Vec<String>>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directory that contains at least one image
    ///
    /// No deduplication: the walk never lists a directory twice.
    pub fn push(&self, dir: String) {
        self.dirs.lock().push(dir);
    }

    /// Number of directories recorded so far
    pub fn len(&self) -> usize {
        self.dirs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.lock().is_empty()
    }

    /// Publish the final, read-only index
    pub fn freeze(self) -> ImageIndex {
        ImageIndex::from_dirs(self.dirs.into_inner())
    }
}
