//! Remote entry types and path helpers
//!
//! These types are what every `RemoteTree` implementation hands back from
//! a directory listing, independent of the transport underneath.

use crate::content::is_image;
use chrono::{DateTime, Utc};

/// Type of remote filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link (never followed by the walker)
    Symlink,
    /// Device, socket, fifo or unknown
    Other,
}

impl EntryType {
    /// Convert from Unix mode bits as reported in SFTP attributes
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o100000 => EntryType::File,      // S_IFREG
            0o040000 => EntryType::Directory, // S_IFDIR
            0o120000 => EntryType::Symlink,   // S_IFLNK
            _ => EntryType::Other,
        }
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }
}

/// A direct child returned from a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name (not full path)
    pub name: String,

    /// Entry type
    pub entry_type: EntryType,

    /// Size in bytes (0 when unknown)
    pub size: u64,

    /// Last modification time (Unix seconds)
    pub mtime: Option<i64>,
}

impl RemoteEntry {
    /// Create a regular file entry
    pub fn file(name: impl Into<String>, size: u64, mtime: Option<i64>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
            size,
            mtime,
        }
    }

    /// Create a directory entry
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
            size: 0,
            mtime: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    /// Non-directory entry whose name has an image extension
    pub fn is_image(&self) -> bool {
        !self.is_dir() && is_image(&self.name)
    }

    /// Modification time as a UTC timestamp
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.mtime.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Join a remote directory path and an entry name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Strip trailing slashes from a remote path, keeping "/" intact
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parent directory of a normalized remote path ("/" has none)
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_mode() {
        assert_eq!(EntryType::from_mode(0o100644), EntryType::File);
        assert_eq!(EntryType::from_mode(0o040755), EntryType::Directory);
        assert_eq!(EntryType::from_mode(0o120777), EntryType::Symlink);
        assert_eq!(EntryType::from_mode(0o020666), EntryType::Other);
        assert_eq!(EntryType::from_mode(0), EntryType::Other);
    }

    #[test]
    fn test_entry_is_image() {
        assert!(RemoteEntry::file("photo.JPG", 10, None).is_image());
        assert!(!RemoteEntry::file("notes.txt", 10, None).is_image());
        // A directory named like an image is still a directory
        assert!(!RemoteEntry::dir("album.png").is_image());
    }

    #[test]
    fn test_modified() {
        let entry = RemoteEntry::file("a.png", 1, Some(1_600_000_000));
        assert_eq!(
            entry.modified().map(|t| t.to_rfc3339()),
            Some("2020-09-13T12:26:40+00:00".to_string())
        );
        assert_eq!(RemoteEntry::file("a.png", 1, None).modified(), None);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/a/", "b"), "/a/b");
    }

    #[test]
    fn test_normalize_and_parent() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("///"), "/");
        assert_eq!(normalize_path("/volume1/photos/"), "/volume1/photos");
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/a/b"), Some("/a"));
    }
}
