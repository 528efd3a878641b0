//! Remote tree walker
//!
//! Builds the image-bearing directory index at startup.
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │    DirectoryIndexer     │
//!                     │  - explicit work-list   │
//!                     │  - 1..N worker threads  │
//!                     └───────────┬─────────────┘
//!                                 │ list_dir
//!                     ┌───────────▼─────────────┐
//!                     │       RemoteTree        │
//!                     └───────────┬─────────────┘
//!                                 │ push(dir)
//!                     ┌───────────▼─────────────┐
//!                     │      IndexBuilder       │
//!                     │  freeze() → ImageIndex  │
//!                     └─────────────────────────┘
//! ```

pub mod indexer;

pub use indexer::{build_index, DirectoryIndexer, WalkProgress, WalkStats};
