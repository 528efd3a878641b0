//! Shared server state
//!
//! Built exactly once, after the index walk has finished, and handed to
//! every request handler behind an `Arc`. Nothing in here is mutated
//! after construction apart from the selection RNG.

use crate::index::ImageIndex;
use crate::remote::RemoteTree;
use crate::selector::RandomImageService;
use crate::walker::WalkStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Walk results exposed on the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    pub root: String,
    pub dirs_listed: u64,
    pub image_dirs: u64,
    pub image_files: u64,
    pub failures: u64,
    pub session_errors: u64,
    pub duration_ms: u64,
    pub completed: bool,
}

impl WalkSummary {
    pub fn from_stats(root: &str, stats: &WalkStats) -> Self {
        Self {
            root: root.to_string(),
            dirs_listed: stats.dirs_listed,
            image_dirs: stats.image_dirs,
            image_files: stats.image_files,
            failures: stats.errors,
            session_errors: stats.session_errors,
            duration_ms: stats.duration.as_millis() as u64,
            completed: stats.completed,
        }
    }
}

/// Application state shared by all handlers
pub struct AppState {
    pub service: RandomImageService,
    pub walk: WalkSummary,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap a finished index and the remote tree it was built from
    pub fn new(index: ImageIndex, tree: Arc<dyn RemoteTree>, walk: WalkSummary) -> Self {
        Self::with_service(RandomImageService::new(index, tree), walk)
    }

    /// Use a preconfigured service (e.g. with a fixed RNG seed)
    pub fn with_service(service: RandomImageService, walk: WalkSummary) -> Self {
        Self {
            service,
            walk,
            started_at: Utc::now(),
        }
    }

    /// The index and accessor as seen by every request
    pub fn snapshot(&self) -> (ImageIndex, Arc<dyn RemoteTree>) {
        (self.service.index().clone(), Arc::clone(self.service.tree()))
    }
}

/// Thread-safe handle to the application state
pub type SharedState = Arc<AppState>;
