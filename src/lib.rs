//! sftp-image-server - Random Images from a Remote SFTP Tree
//!
//! Walks a remote directory tree over SFTP once at startup, remembers
//! every directory that directly holds at least one image, and then
//! serves a random image from one of those directories per HTTP request.
//!
//! # Features
//!
//! - **Startup Index**: A single walk from the configured root records
//!   image-bearing directories. Subtrees that fail to list are skipped
//!   and reported, never fatal.
//!
//! - **Parallel Walking**: Optional work-stealing walker threads share a
//!   small pool of SFTP sessions.
//!
//! - **Fresh Reads**: Each request re-lists the chosen directory, so
//!   images added or removed after startup are picked up within an
//!   indexed directory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SFTP Server                              │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ readdir / open
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │       SftpPool       │
//!                    │  (RemoteTree impl)   │
//!                    └──────┬────────┬──────┘
//!              startup walk │        │ per request
//!                           ▼        ▼
//!          ┌──────────────────┐  ┌──────────────────────┐
//!          │ DirectoryIndexer │  │  RandomImageService  │
//!          │  → ImageIndex    │─▶│  pick dir, pick file │
//!          └──────────────────┘  └──────────┬───────────┘
//!                                           │
//!                                           ▼
//!                                ┌──────────────────────┐
//!                                │   axum HTTP server   │
//!                                │  GET /getRandomImage │
//!                                └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Credentials can also live in .env
//! SSH_PASSWORD=secret sftp-image-server --ssh-host nas.local --ssh-user photos \
//!     --root /volume1/photos --port 3141
//!
//! curl -o image http://localhost:3141/getRandomImage
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod index;
pub mod progress;
pub mod remote;
pub mod selector;
pub mod server;
pub mod walker;

pub use config::{CliArgs, ServerConfig, WalkOptions};
pub use error::{AppError, RemoteError, Result, ServeError};
pub use index::{ImageIndex, IndexBuilder};
pub use remote::{RemoteTree, SftpPool, SftpTarget};
pub use selector::{RandomImage, RandomImageService};
pub use walker::{build_index, DirectoryIndexer, WalkStats};
