//! Random image selection
//!
//! Serves one request end to end: pick a directory from the index, list
//! it again, pick one of the images it holds right now, and read that
//! file in full. Nothing is cached between requests, and no step is
//! retried; the remote tree may have changed since the index was built,
//! and those races surface as request errors.

use crate::error::{RemoteError, ServeError, ServeResult};
use crate::index::ImageIndex;
use crate::remote::{join_path, RemoteTree};
use chrono::{DateTime, Utc};
use humansize::{format_size, BINARY};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Chunk size for remote reads; cancellation is checked between chunks
const READ_CHUNK: usize = 64 * 1024;

/// One image found while listing a directory for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub path: String,
    pub modified: Option<DateTime<Utc>>,
}

/// A fully read image ready to send
#[derive(Debug, Clone)]
pub struct RandomImage {
    pub path: String,
    pub content_type: &'static str,
    pub modified: Option<DateTime<Utc>>,
    pub bytes: Vec<u8>,
}

/// Shared flag a caller raises to abandon a request
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Guard that cancels the flag when dropped, unless disarmed first
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: Some(self.clone()),
        }
    }
}

/// Raises its `CancelFlag` on drop
///
/// Held by the async request handler: if the client disconnects, the
/// handler future is dropped and the blocking read stops at the next
/// chunk boundary.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: Option<CancelFlag>,
}

impl CancelOnDrop {
    /// Completed normally; do not cancel
    pub fn disarm(mut self) {
        self.flag = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.cancel();
        }
    }
}

/// Picks and reads a random image from the indexed directories
pub struct RandomImageService {
    index: ImageIndex,
    tree: Arc<dyn RemoteTree>,
    rng: Mutex<StdRng>,
}

impl RandomImageService {
    /// Create a service with an RNG seeded from OS entropy
    pub fn new(index: ImageIndex, tree: Arc<dyn RemoteTree>) -> Self {
        Self::with_rng(index, tree, StdRng::from_entropy())
    }

    /// Create a service with a fixed seed (deterministic picks)
    pub fn with_seed(index: ImageIndex, tree: Arc<dyn RemoteTree>, seed: u64) -> Self {
        Self::with_rng(index, tree, StdRng::seed_from_u64(seed))
    }

    fn with_rng(index: ImageIndex, tree: Arc<dyn RemoteTree>, rng: StdRng) -> Self {
        Self {
            index,
            tree,
            rng: Mutex::new(rng),
        }
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    pub fn tree(&self) -> &Arc<dyn RemoteTree> {
        &self.tree
    }

    /// Serve one random image
    pub fn serve_random_image(&self) -> ServeResult<RandomImage> {
        self.serve_random_image_until(&CancelFlag::new())
    }

    /// Serve one random image, stopping early if `cancel` is raised
    pub fn serve_random_image_until(&self, cancel: &CancelFlag) -> ServeResult<RandomImage> {
        let dir = self
            .index
            .choose(&mut *self.rng.lock())
            .map(str::to_string)
            .ok_or(ServeError::NoIndexedDirectories)?;

        let candidates = self.list_candidates(&dir)?;
        if candidates.is_empty() {
            return Err(ServeError::NoImagesInDirectory { path: dir });
        }

        let chosen = {
            let idx = self.rng.lock().gen_range(0..candidates.len());
            candidates[idx].clone()
        };

        let bytes = self.read_image(&chosen.path, cancel)?;

        debug!(
            path = %chosen.path,
            candidates = candidates.len(),
            "Serving {}",
            format_size(bytes.len(), BINARY)
        );

        Ok(RandomImage {
            content_type: crate::content::content_type(&chosen.path),
            path: chosen.path,
            modified: chosen.modified,
            bytes,
        })
    }

    /// Images directly inside `dir` right now
    pub fn list_candidates(&self, dir: &str) -> ServeResult<Vec<ImageCandidate>> {
        let entries = self
            .tree
            .list_dir(dir)
            .map_err(|source| ServeError::DirectoryListFailed {
                path: dir.to_string(),
                source,
            })?;

        Ok(entries
            .iter()
            .filter(|e| e.is_image())
            .map(|e| ImageCandidate {
                path: join_path(dir, &e.name),
                modified: e.modified(),
            })
            .collect())
    }

    /// Read a whole remote file; the handle is released on every return
    fn read_image(&self, path: &str, cancel: &CancelFlag) -> ServeResult<Vec<u8>> {
        let mut reader = self
            .tree
            .open_read(path)
            .map_err(|source| ServeError::ImageReadFailed {
                path: path.to_string(),
                source,
            })?;

        let mut bytes = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            if cancel.is_cancelled() {
                debug!(path, "Read abandoned by caller");
                return Err(ServeError::Cancelled);
            }
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ServeError::ImageReadFailed {
                        path: path.to_string(),
                        source: RemoteError::ReadFailed {
                            path: path.to_string(),
                            reason: e.to_string(),
                        },
                    })
                }
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryTree;
    use std::collections::HashSet;

    fn service(tree: &Arc<MemoryTree>, dirs: &[&str], seed: u64) -> RandomImageService {
        let index = ImageIndex::from_dirs(dirs.iter().map(|d| d.to_string()).collect());
        RandomImageService::with_seed(index, Arc::clone(tree) as Arc<dyn RemoteTree>, seed)
    }

    #[test]
    fn test_empty_index_does_no_io() {
        let tree = Arc::new(MemoryTree::new());
        let svc = service(&tree, &[], 1);
        assert!(matches!(
            svc.serve_random_image(),
            Err(ServeError::NoIndexedDirectories)
        ));
        assert_eq!(tree.list_calls(), 0);
        assert_eq!(tree.open_calls(), 0);
    }

    #[test]
    fn test_serves_bytes_type_and_mtime() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file_with_mtime("/a/photo.JPG", vec![0xFF, 0xD8, 0xFF], Some(1_600_000_000))
            .add_file("/a/notes.txt", "not an image");

        let image = service(&tree, &["/a"], 3).serve_random_image().unwrap();
        assert_eq!(image.path, "/a/photo.JPG");
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.bytes, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(
            image.modified.map(|t| t.timestamp()),
            Some(1_600_000_000)
        );
    }

    #[test]
    fn test_emptied_directory() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file("/a/notes.txt", "x").add_dir("/b");
        let svc = service(&tree, &["/a", "/b"], 5);
        for _ in 0..20 {
            assert!(matches!(
                svc.serve_random_image(),
                Err(ServeError::NoImagesInDirectory { .. })
            ));
        }
        assert_eq!(tree.open_calls(), 0);
    }

    #[test]
    fn test_removed_directory_is_list_failure() {
        let tree = Arc::new(MemoryTree::new());
        let svc = service(&tree, &["/gone"], 9);
        let err = svc.serve_random_image().unwrap_err();
        assert!(matches!(err, ServeError::DirectoryListFailed { ref path, .. } if path == "/gone"));
    }

    #[test]
    fn test_file_removed_after_listing() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file("/a/x.png", "x").fail_open("/a/x.png");
        let err = service(&tree, &["/a"], 11).serve_random_image().unwrap_err();
        assert!(matches!(err, ServeError::ImageReadFailed { ref path, .. } if path == "/a/x.png"));
    }

    #[test]
    fn test_both_images_eventually_served() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file("/a/one.png", "1").add_file("/b/two.gif", "2");
        let svc = service(&tree, &["/a", "/b"], 1234);

        let seen: HashSet<String> = (0..1000)
            .map(|_| svc.serve_random_image().unwrap().path)
            .collect();
        assert_eq!(
            seen,
            ["/a/one.png", "/b/two.gif"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_pick_within_directory_is_uniform_enough() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file("/a/1.png", "1")
            .add_file("/a/2.png", "2")
            .add_file("/a/3.png", "3");
        let svc = service(&tree, &["/a"], 99);

        let mut counts = std::collections::HashMap::new();
        for _ in 0..3000 {
            *counts.entry(svc.serve_random_image().unwrap().path).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c > 800 && c < 1200), "{counts:?}");
    }

    #[test]
    fn test_cancelled_read() {
        let tree = Arc::new(MemoryTree::new());
        tree.add_file("/a/big.png", vec![0u8; READ_CHUNK * 4]);
        let svc = service(&tree, &["/a"], 2);

        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            svc.serve_random_image_until(&cancel),
            Err(ServeError::Cancelled)
        ));
        // Large files still read fully when not cancelled
        assert_eq!(svc.serve_random_image().unwrap().bytes.len(), READ_CHUNK * 4);
    }

    #[test]
    fn test_cancel_on_drop_guard() {
        let flag = CancelFlag::new();
        drop(flag.cancel_on_drop());
        assert!(flag.is_cancelled());

        let flag = CancelFlag::new();
        flag.cancel_on_drop().disarm();
        assert!(!flag.is_cancelled());
    }
}
