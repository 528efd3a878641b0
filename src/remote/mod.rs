//! Remote filesystem access
//!
//! The indexer and the random image service only ever need two things
//! from the remote side: list a directory, and open a file for reading.
//! `RemoteTree` captures exactly that so the core logic can run against
//! SFTP in production and an in-memory tree in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      SftpPool                        │
//! │  - N SSH sessions, handed out round-robin            │
//! │  - each session serializes its own calls             │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//!            ┌───────────────┼───────────────┐
//!            ▼               ▼               ▼
//!   ┌────────────────┐ ┌────────────────┐ ┌────────────────┐
//!   │ SftpConnection │ │ SftpConnection │ │ SftpConnection │
//!   │  libssh2 +     │ │  libssh2 +     │ │  libssh2 +     │
//!   │  SFTP channel  │ │  SFTP channel  │ │  SFTP channel  │
//!   └────────────────┘ └────────────────┘ └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sftp_image_server::remote::{RemoteTree, SftpPool, SftpTarget};
//! use std::time::Duration;
//!
//! let target = SftpTarget::new("nas.local", 22, "photos", "secret");
//! let pool = SftpPool::connect(&target, 2, Some(Duration::from_secs(30)), 3).unwrap();
//!
//! for entry in pool.list_dir("/volume1/photos").unwrap() {
//!     println!("{}: {:?}", entry.name, entry.entry_type);
//! }
//! ```

pub mod memory;
pub mod sftp;
pub mod types;

use crate::error::RemoteResult;
use std::io::Read;
use std::sync::Arc;

pub use memory::MemoryTree;
pub use sftp::{SftpConnection, SftpConnectionBuilder, SftpPool, SftpTarget};
pub use types::{join_path, normalize_path, parent_path, EntryType, RemoteEntry};

/// Byte stream for one open remote file
///
/// Dropping the reader releases the remote handle.
pub type RemoteReader = Box<dyn Read + Send>;

/// Read-only access to a remote directory tree
///
/// Implementations must be safe to call from many threads at once,
/// either natively or by serializing internally.
pub trait RemoteTree: Send + Sync {
    /// List the direct entries of a directory, without `.` and `..`
    fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Open a file for sequential reading
    fn open_read(&self, path: &str) -> RemoteResult<RemoteReader>;

    /// Short description for log output
    fn describe(&self) -> String;
}

impl<T: RemoteTree + ?Sized> RemoteTree for Arc<T> {
    fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        (**self).list_dir(path)
    }

    fn open_read(&self, path: &str) -> RemoteResult<RemoteReader> {
        (**self).open_read(path)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
