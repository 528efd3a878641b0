//! Directory indexer
//!
//! Walks the remote tree once from a root and records every directory
//! that directly contains at least one image file.
//!
//! Serial mode keeps an explicit stack of pending directories, so depth
//! is bounded only by memory. Parallel mode spreads directories over
//! named worker threads with work stealing:
//!
//! ```text
//! Injector (root)
//! │
//! ├── Worker 0: pop dir → list → record if images → push subdirs
//! ├── Worker 1: pop dir → list → record if images → push subdirs
//! └── Worker N: pop dir → list → record if images → push subdirs
//! │
//! └── IndexBuilder (mutex) ← every append
//! ```
//!
//! A directory whose listing fails is logged and skipped together with
//! its subtree; the rest of the walk continues. Failures are split by
//! `RemoteError::is_recoverable`: path-scoped ones (missing, permission
//! denied) are warnings, a broken SSH session is an error and is counted
//! separately so the caller can tell the index may be badly incomplete.

use crate::config::WalkOptions;
use crate::error::{Result, WalkFailure, WorkerError};
use crate::index::{ImageIndex, IndexBuilder};
use crate::remote::{join_path, normalize_path, RemoteTree};
use crossbeam_deque::{Injector, Steal, Stealer, Worker as DequeWorker};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Directory work item
#[derive(Debug, Clone)]
struct DirWork {
    path: String,
    depth: usize,
}

/// Result of a completed walk
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// Directories successfully listed
    pub dirs_listed: u64,
    /// Directories recorded in the index
    pub image_dirs: u64,
    /// Image files seen across all recorded directories
    pub image_files: u64,
    /// Listings that failed
    pub errors: u64,
    /// One record per failed listing
    pub failures: Vec<WalkFailure>,
    pub duration: Duration,
    /// Failures caused by a broken session rather than a single path
    pub session_errors: u64,
    /// False if the walk was stopped by the shutdown flag
    pub completed: bool,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub dirs_listed: u64,
    pub image_dirs: u64,
    pub errors: u64,
    pub pending: u64,
    pub elapsed: Duration,
}

impl WalkProgress {
    pub fn dirs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.dirs_listed as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    dirs_listed: AtomicU64,
    image_dirs: AtomicU64,
    image_files: AtomicU64,
    errors: AtomicU64,
    session_errors: AtomicU64,
    pending: AtomicU64,
}

/// Builds the image-bearing directory index
pub struct DirectoryIndexer {
    options: WalkOptions,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl DirectoryIndexer {
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Flag that stops the walk early when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn progress(&self, elapsed: Duration) -> WalkProgress {
        WalkProgress {
            dirs_listed: self.counters.dirs_listed.load(Ordering::Relaxed),
            image_dirs: self.counters.image_dirs.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Walk the whole tree and return the frozen index
    ///
    /// Blocks until every worker has finished.
    pub fn run<T: RemoteTree + ?Sized>(&self, tree: &T) -> Result<(ImageIndex, WalkStats)> {
        let start = Instant::now();
        let root = normalize_path(&self.options.root);
        let sink = WalkSink::default();

        info!(
            root = %root,
            workers = self.options.workers,
            "Indexing {}",
            tree.describe()
        );

        if self.options.workers <= 1 {
            self.walk_serial(tree, &root, &sink);
        } else {
            self.walk_parallel(tree, &root, &sink)?;
        }

        Ok(self.collect(sink, start))
    }

    /// Run the walk while polling progress every 100ms
    pub fn run_with_progress<T, F>(
        &self,
        tree: &T,
        progress_callback: F,
    ) -> Result<(ImageIndex, WalkStats)>
    where
        T: RemoteTree + ?Sized,
        F: Fn(WalkProgress) + Send,
    {
        let start = Instant::now();
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            let done = &done;
            s.spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    progress_callback(self.progress(start.elapsed()));
                    thread::sleep(Duration::from_millis(100));
                }
            });

            let result = self.run(tree);
            done.store(true, Ordering::SeqCst);
            result
        })
    }

    fn collect(&self, sink: WalkSink, start: Instant) -> (ImageIndex, WalkStats) {
        let stats = WalkStats {
            dirs_listed: self.counters.dirs_listed.load(Ordering::Relaxed),
            image_dirs: self.counters.image_dirs.load(Ordering::Relaxed),
            image_files: self.counters.image_files.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            session_errors: self.counters.session_errors.load(Ordering::Relaxed),
            failures: sink.failures.into_inner(),
            duration: start.elapsed(),
            completed: !self.shutdown.load(Ordering::Relaxed),
        };
        (sink.builder.freeze(), stats)
    }

    fn walk_serial<T: RemoteTree + ?Sized>(&self, tree: &T, root: &str, sink: &WalkSink) {
        let mut stack = vec![DirWork {
            path: root.to_string(),
            depth: 0,
        }];
        self.counters.pending.store(1, Ordering::Relaxed);

        while let Some(work) = stack.pop() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let mut children = Vec::new();
            self.visit(tree, &work, sink, |child| children.push(child));

            // Reverse so siblings are visited in listing order
            self.counters
                .pending
                .fetch_add(children.len() as u64, Ordering::Relaxed);
            stack.extend(children.into_iter().rev());
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn walk_parallel<T: RemoteTree + ?Sized>(
        &self,
        tree: &T,
        root: &str,
        sink: &WalkSink,
    ) -> Result<()> {
        let worker_count = self.options.workers;
        let injector: Injector<DirWork> = Injector::new();

        // Start with 1 for root
        self.counters.pending.store(1, Ordering::SeqCst);
        injector.push(DirWork {
            path: root.to_string(),
            depth: 0,
        });

        let mut locals: Vec<DequeWorker<DirWork>> = Vec::with_capacity(worker_count);
        let mut stealers: Vec<Stealer<DirWork>> = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let w = DequeWorker::new_fifo();
            stealers.push(w.stealer());
            locals.push(w);
        }

        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(worker_count);

            for (id, local) in locals.into_iter().enumerate() {
                let injector = &injector;
                let stealers = &stealers;

                let handle = thread::Builder::new()
                    .name(format!("indexer-{}", id))
                    .spawn_scoped(s, move || {
                        self.worker_loop(id, tree, local, injector, stealers, sink)
                    })
                    .map_err(|e| WorkerError::SpawnFailed {
                        id,
                        reason: e.to_string(),
                    });

                match handle {
                    Ok(h) => handles.push((id, h)),
                    Err(e) => {
                        // Let the workers already running drain and exit
                        self.shutdown.store(true, Ordering::SeqCst);
                        for (_, h) in handles {
                            let _ = h.join();
                        }
                        return Err(e.into());
                    }
                }
            }

            for (id, handle) in handles {
                handle
                    .join()
                    .map_err(|_| WorkerError::Panicked { id })?;
            }
            Ok(())
        })
    }

    fn worker_loop<T: RemoteTree + ?Sized>(
        &self,
        id: usize,
        tree: &T,
        local: DequeWorker<DirWork>,
        injector: &Injector<DirWork>,
        stealers: &[Stealer<DirWork>],
        sink: &WalkSink,
    ) {
        debug!("Indexer {} started", id);

        let mut idle_spins = 0u32;
        const MAX_IDLE_SPINS: u32 = 1000;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Try to get work: local queue first, then injector, then steal
            let work = local.pop().or_else(|| {
                loop {
                    match injector.steal_batch_and_pop(&local) {
                        Steal::Success(w) => return Some(w),
                        Steal::Empty => break,
                        Steal::Retry => continue,
                    }
                }
                for (i, stealer) in stealers.iter().enumerate() {
                    if i == id {
                        continue;
                    }
                    loop {
                        match stealer.steal() {
                            Steal::Success(w) => return Some(w),
                            Steal::Empty => break,
                            Steal::Retry => continue,
                        }
                    }
                }
                None
            });

            let work = match work {
                Some(w) => {
                    idle_spins = 0;
                    w
                }
                None => {
                    // Pending counts queued and in-flight directories
                    if self.counters.pending.load(Ordering::SeqCst) == 0 {
                        break;
                    }

                    idle_spins += 1;
                    if idle_spins > MAX_IDLE_SPINS {
                        thread::sleep(Duration::from_micros(100));
                        idle_spins = 0;
                    } else {
                        thread::yield_now();
                    }
                    continue;
                }
            };

            self.visit(tree, &work, sink, |child| {
                self.counters.pending.fetch_add(1, Ordering::SeqCst);
                local.push(child);
            });

            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        }

        debug!("Indexer {} finished", id);
    }

    /// List one directory, record it if it holds images, and hand its
    /// subdirectories to `push_child`
    fn visit<T, F>(&self, tree: &T, work: &DirWork, sink: &WalkSink, mut push_child: F)
    where
        T: RemoteTree + ?Sized,
        F: FnMut(DirWork),
    {
        if self.options.is_excluded(&work.path) {
            debug!(path = %work.path, "Excluded");
            return;
        }

        let entries = match tree.list_dir(&work.path) {
            Ok(entries) => entries,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                if e.is_recoverable() {
                    warn!(path = %work.path, "Skipping subtree: {}", e);
                } else {
                    self.counters.session_errors.fetch_add(1, Ordering::Relaxed);
                    error!(path = %work.path, "Skipping subtree after session error: {}", e);
                }
                sink.failures.lock().push(WalkFailure {
                    path: work.path.clone(),
                    error: e,
                });
                return;
            }
        };
        self.counters.dirs_listed.fetch_add(1, Ordering::Relaxed);

        let image_count = entries.iter().filter(|e| e.is_image()).count() as u64;
        let indent = "  ".repeat(work.depth);
        let name = display_name(&work.path);

        if image_count > 0 {
            sink.builder.push(work.path.clone());
            self.counters.image_dirs.fetch_add(1, Ordering::Relaxed);
            self.counters
                .image_files
                .fetch_add(image_count, Ordering::Relaxed);
            debug!("{}{}/ (contains images)", indent, name);
        } else {
            debug!("{}{}/", indent, name);
        }

        let child_depth = work.depth + 1;
        if let Some(max) = self.options.max_depth {
            if child_depth > max {
                return;
            }
        }

        for entry in entries.iter().filter(|e| e.is_dir()) {
            push_child(DirWork {
                path: join_path(&work.path, &entry.name),
                depth: child_depth,
            });
        }
    }
}

/// Everything the walk threads write to
#[derive(Default)]
struct WalkSink {
    builder: IndexBuilder,
    failures: Mutex<Vec<WalkFailure>>,
}

/// Walk `root` serially with default options
pub fn build_index<T: RemoteTree + ?Sized>(tree: &T, root: &str) -> (ImageIndex, WalkStats) {
    let indexer = DirectoryIndexer::new(WalkOptions::new(root));
    let sink = WalkSink::default();
    let start = Instant::now();

    indexer.walk_serial(tree, &normalize_path(root), &sink);

    indexer.collect(sink, start)
}

fn display_name(path: &str) -> &str {
    if path == "/" {
        return "";
    }
    path.rsplit('/').next().unwrap_or(path)
}
