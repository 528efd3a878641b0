//! SFTP access over libssh2
//!
//! Each `SftpConnection` owns one SSH session and its SFTP channel.
//! libssh2 sessions lock internally, so a single connection is safe to
//! share but only runs one operation at a time. `SftpPool` spreads calls
//! over several sessions to keep concurrent requests from queueing up
//! behind one another.
//!
//! Host keys are not verified.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::types::{EntryType, RemoteEntry};
use crate::remote::{RemoteReader, RemoteTree};
use ssh2::{ErrorCode, Session, Sftp};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SFTP status codes we map to specific errors
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;

/// Where and as whom to connect
#[derive(Clone, PartialEq, Eq)]
pub struct SftpTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl SftpTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// `user@host:port` for display
    pub fn to_display_string(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keep the password out of logs
impl fmt::Debug for SftpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One authenticated SSH session with an open SFTP channel
pub struct SftpConnection {
    sftp: Sftp,
    session: Session,
    server: String,
}

impl SftpConnection {
    /// Connect, handshake, authenticate and open the SFTP subsystem
    pub fn connect_to(target: &SftpTarget, timeout: Option<Duration>) -> RemoteResult<Self> {
        let server = target.server();

        let tcp = connect_tcp(target, timeout)?;

        let mut session = Session::new().map_err(|e| RemoteError::HandshakeFailed {
            server: server.clone(),
            reason: e.to_string(),
        })?;
        if let Some(timeout) = timeout {
            session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        }
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| RemoteError::HandshakeFailed {
            server: server.clone(),
            reason: e.to_string(),
        })?;

        session
            .userauth_password(&target.user, &target.password)
            .map_err(|e| RemoteError::AuthFailed {
                server: server.clone(),
                user: target.user.clone(),
                reason: e.to_string(),
            })?;
        if !session.authenticated() {
            return Err(RemoteError::AuthFailed {
                server,
                user: target.user.clone(),
                reason: "server did not accept the password".into(),
            });
        }

        let sftp = session.sftp().map_err(|e| RemoteError::HandshakeFailed {
            server: server.clone(),
            reason: format!("SFTP subsystem unavailable: {}", e),
        })?;

        Ok(Self {
            sftp,
            session,
            server,
        })
    }

    /// List a directory with attributes
    pub fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let listing = self
            .sftp
            .readdir(Path::new(path))
            .map_err(|e| map_sftp_error(&self.server, path, e, ListOrOpen::List))?;

        let entries = listing
            .into_iter()
            .filter_map(|(full_path, stat)| {
                // Paths travel as String end to end; a name that is not
                // UTF-8 could be neither listed nor opened again, so skip it.
                let raw = full_path.file_name()?;
                let Some(name) = raw.to_str().map(str::to_string) else {
                    debug!(dir = path, name = ?raw, "Skipping non-UTF-8 entry");
                    return None;
                };
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    name,
                    entry_type: stat
                        .perm
                        .map(EntryType::from_mode)
                        .unwrap_or(EntryType::Other),
                    size: stat.size.unwrap_or(0),
                    mtime: stat.mtime.map(|t| t as i64),
                })
            })
            .collect();

        Ok(entries)
    }

    /// Open a file for reading
    pub fn open_read(&self, path: &str) -> RemoteResult<ssh2::File> {
        self.sftp
            .open(Path::new(path))
            .map_err(|e| map_sftp_error(&self.server, path, e, ListOrOpen::Open))
    }

    /// Server this connection talks to
    pub fn server(&self) -> &str {
        &self.server
    }
}

impl Drop for SftpConnection {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            debug!(server = %self.server, "SSH disconnect failed: {}", e);
        }
    }
}

fn connect_tcp(target: &SftpTarget, timeout: Option<Duration>) -> RemoteResult<TcpStream> {
    let server = target.server();
    let addrs = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| RemoteError::ConnectionFailed {
            server: server.clone(),
            reason: format!("address resolution failed: {}", e),
        })?;

    let mut last_error = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(RemoteError::ConnectionFailed {
        server,
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "host resolved to no addresses".into()),
    })
}

#[derive(Clone, Copy)]
enum ListOrOpen {
    List,
    Open,
}

fn map_sftp_error(server: &str, path: &str, err: ssh2::Error, op: ListOrOpen) -> RemoteError {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) => RemoteError::NotFound { path: path.into() },
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => RemoteError::PermissionDenied { path: path.into() },
        // libssh2 session-level codes: the transport itself is broken
        ErrorCode::Session(_) => RemoteError::SessionFailed {
            server: server.into(),
            reason: err.to_string(),
        },
        ErrorCode::SFTP(_) => match op {
            ListOrOpen::List => RemoteError::ReadDirFailed {
                path: path.into(),
                reason: err.to_string(),
            },
            ListOrOpen::Open => RemoteError::OpenFailed {
                path: path.into(),
                reason: err.to_string(),
            },
        },
    }
}

/// Builder for SFTP connections with retry support
pub struct SftpConnectionBuilder {
    target: SftpTarget,
    timeout: Option<Duration>,
    retries: u32,
}

impl SftpConnectionBuilder {
    /// Create a new builder
    pub fn new(target: SftpTarget) -> Self {
        Self {
            target,
            timeout: Some(Duration::from_secs(30)),
            retries: 3,
        }
    }

    /// Set session timeout (`None` blocks indefinitely)
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Build and connect with retries
    ///
    /// Authentication failures are not retried.
    pub fn connect(self) -> RemoteResult<SftpConnection> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                // Exponential backoff: 100ms, 200ms, 400ms, ...
                let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(10)));
                std::thread::sleep(delay);
            }

            match SftpConnection::connect_to(&self.target, self.timeout) {
                Ok(conn) => return Ok(conn),
                Err(e @ RemoteError::AuthFailed { .. }) => return Err(e),
                Err(e) => {
                    warn!(attempt, server = %self.target.server(), "Connection attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::ConnectionFailed {
            server: self.target.server(),
            reason: "Connection failed after all retries".into(),
        }))
    }
}

/// Fixed set of SFTP sessions shared by all callers
pub struct SftpPool {
    connections: Vec<SftpConnection>,
    next: AtomicUsize,
    target: SftpTarget,
}

impl SftpPool {
    /// Open `count` sessions up front
    pub fn connect(
        target: &SftpTarget,
        count: usize,
        timeout: Option<Duration>,
        retries: u32,
    ) -> RemoteResult<Self> {
        let count = count.max(1);
        let mut connections = Vec::with_capacity(count);

        for id in 0..count {
            let conn = SftpConnectionBuilder::new(target.clone())
                .timeout(timeout)
                .retries(retries)
                .connect()?;
            info!("SFTP session {} connected to {}", id, conn.server());
            connections.push(conn);
        }

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            target: target.clone(),
        })
    }

    /// Number of sessions in the pool
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    fn pick(&self) -> &SftpConnection {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        &self.connections[idx]
    }
}

impl RemoteTree for SftpPool {
    fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.pick().list_dir(path)
    }

    fn open_read(&self, path: &str) -> RemoteResult<RemoteReader> {
        let file = self.pick().open_read(path)?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        format!(
            "sftp://{} ({} sessions)",
            self.target.to_display_string(),
            self.size()
        )
    }
}
