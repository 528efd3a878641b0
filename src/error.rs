//! Error types for sftp-image-server
//!
//! This module defines the error hierarchy for:
//! - SFTP session and remote filesystem errors
//! - Configuration and CLI errors
//! - Per-request errors from the random image service
//! - Per-directory failures recorded during the index walk
//!
//! Library code uses thiserror; the binary wraps these in anyhow.

use axum::http::StatusCode;
use thiserror::Error;

/// Top-level error type for the server
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote filesystem errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Walk worker errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (listener bind, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// SFTP session and remote filesystem errors
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// TCP connection failed
    #[error("Failed to connect to '{server}': {reason}")]
    ConnectionFailed { server: String, reason: String },

    /// SSH handshake or SFTP subsystem setup failed
    #[error("SSH handshake with '{server}' failed: {reason}")]
    HandshakeFailed { server: String, reason: String },

    /// Password authentication rejected
    #[error("Authentication as '{user}' on '{server}' failed: {reason}")]
    AuthFailed {
        server: String,
        user: String,
        reason: String,
    },

    /// The SSH session or SFTP channel broke mid-operation
    #[error("SFTP session to '{server}' failed: {reason}")]
    SessionFailed { server: String, reason: String },

    /// Directory listing failed
    #[error("Failed to read directory '{path}': {reason}")]
    ReadDirFailed { path: String, reason: String },

    /// Opening a file failed
    #[error("Failed to open file '{path}': {reason}")]
    OpenFailed { path: String, reason: String },

    /// Reading file contents failed
    #[error("Failed to read file '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    /// Permission denied
    #[error("Permission denied: '{path}'")]
    PermissionDenied { path: String },

    /// Path not found
    #[error("Path not found: '{path}'")]
    NotFound { path: String },
}

impl RemoteError {
    /// Check if this error only affects one path (skip it and keep going)
    ///
    /// Connection, authentication and session errors are not: every later
    /// call through the same session would fail too.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RemoteError::PermissionDenied { .. }
                | RemoteError::NotFound { .. }
                | RemoteError::ReadDirFailed { .. }
                | RemoteError::OpenFailed { .. }
                | RemoteError::ReadFailed { .. }
        )
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required setting missing or empty
    #[error("Missing required setting {name} (set --{flag} or {env})")]
    MissingSetting {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    /// Invalid SFTP connection count
    #[error("Invalid connection count {count}: must be between 1 and {max}")]
    InvalidConnectionCount { count: usize, max: usize },

    /// Invalid walk worker count
    #[error("Invalid walk worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Walk root is not an absolute remote path
    #[error("Invalid root '{root}': must be an absolute path")]
    InvalidRoot { root: String },

    /// Bind address could not be parsed or resolved
    #[error("Invalid bind address '{addr}': {reason}")]
    InvalidBindAddress { addr: String, reason: String },
}

/// Walk worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread panicked
    #[error("Walk worker {id} panicked")]
    Panicked { id: usize },

    /// Worker thread could not be spawned
    #[error("Failed to spawn walk worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },
}

/// Errors from serving one random image request
#[derive(Error, Debug)]
pub enum ServeError {
    /// The index holds no directories at all
    #[error("No directories with images found")]
    NoIndexedDirectories,

    /// Listing the chosen directory failed
    #[error("Failed to read directory '{path}': {source}")]
    DirectoryListFailed {
        path: String,
        #[source]
        source: RemoteError,
    },

    /// The chosen directory no longer holds any image
    #[error("No images found in selected directory '{path}'")]
    NoImagesInDirectory { path: String },

    /// Opening or reading the chosen image failed
    #[error("Failed to read image file '{path}': {source}")]
    ImageReadFailed {
        path: String,
        #[source]
        source: RemoteError,
    },

    /// The caller went away before the image was fully read
    #[error("Request cancelled")]
    Cancelled,

    /// A blocking task failed outside the service itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServeError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::NoIndexedDirectories | ServeError::NoImagesInDirectory { .. } => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServeError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// A directory whose listing failed during the index walk
///
/// The walk logs these and carries on with the rest of the tree.
#[derive(Debug, Clone)]
pub struct WalkFailure {
    pub path: String,
    pub error: RemoteError,
}

impl std::fmt::Display for WalkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "walk of subtree '{}' failed: {}", self.path, self.error)
    }
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for RemoteError
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Result type alias for ServeError
pub type ServeResult<T> = std::result::Result<T, ServeError>;
