//! Configuration types for sftp-image-server
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros, with environment
//!   variable fallbacks (optionally loaded from a `.env` file)
//! - Runtime configuration with validation
//! - Walk options shared by the indexer

use crate::error::ConfigError;
use crate::remote::{normalize_path, SftpTarget};
use clap::Parser;
use regex::Regex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum SFTP sessions in the pool
const MAX_CONNECTIONS: usize = 64;

/// Maximum walk worker threads
const MAX_WALK_WORKERS: usize = 256;

/// Serve a random image from an SFTP tree over HTTP
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sftp-image-server",
    version,
    about = "Serve a random image from an SFTP tree over HTTP",
    long_about = "Connects to an SSH server with a password, walks the remote tree once to find\n\
                  every directory that directly contains images, then serves one random image\n\
                  per request on GET /getRandomImage.\n\n\
                  Every option can also be set through the environment or a .env file.",
    after_help = "EXAMPLES:\n    \
        sftp-image-server --ssh-host nas.local --ssh-user photos --ssh-password secret\n    \
        SSH_HOST=nas SSH_USER=me SSH_PASSWORD=pw sftp-image-server --root /volume1/photos\n    \
        sftp-image-server --walk-workers 8 --connections 8 --exclude '@eaDir' -v"
)]
pub struct CliArgs {
    /// SSH server hostname or IP
    #[arg(long, env = "SSH_HOST", value_name = "HOST")]
    pub ssh_host: Option<String>,

    /// SSH server port
    #[arg(long, env = "SSH_PORT", default_value_t = 22, value_name = "PORT")]
    pub ssh_port: u16,

    /// SSH username
    #[arg(long, env = "SSH_USER", value_name = "USER")]
    pub ssh_user: Option<String>,

    /// SSH password
    #[arg(long, env = "SSH_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub ssh_password: Option<String>,

    /// Local address to bind the HTTP server to
    #[arg(long = "host", env = "SERVER_HOST", default_value = "localhost", value_name = "HOST")]
    pub server_host: String,

    /// Local port for the HTTP server
    #[arg(long = "port", env = "SERVER_PORT", default_value_t = 3141, value_name = "PORT")]
    pub server_port: u16,

    /// Remote directory to start indexing from
    #[arg(long, env = "IMAGE_ROOT", default_value = "/", value_name = "PATH")]
    pub root: String,

    /// Number of SFTP sessions shared by requests and the walk
    #[arg(long, env = "SFTP_CONNECTIONS", default_value_t = 2, value_name = "NUM")]
    pub connections: usize,

    /// Number of threads walking the tree at startup
    #[arg(short = 'w', long, env = "WALK_WORKERS", default_value_t = 1, value_name = "NUM")]
    pub walk_workers: usize,

    /// Maximum directory depth (unlimited if not set)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Skip directories whose path matches pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// SSH session timeout in seconds (0 disables)
    #[arg(long, env = "SSH_TIMEOUT", default_value = "30", value_name = "SECS")]
    pub timeout: u64,

    /// Number of retry attempts when connecting
    #[arg(long, env = "SSH_RETRIES", default_value = "3", value_name = "NUM")]
    pub retries: u32,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (log the directory tree and every request)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Load variables from a `.env`-style file into the process environment
///
/// Variables already set in the environment win. Returns `Ok(false)` if
/// the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Options controlling the index walk
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Remote path to start from
    pub root: String,

    /// Maximum traversal depth (root is 0)
    pub max_depth: Option<usize>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Worker threads (1 walks on the calling thread)
    pub workers: usize,
}

impl WalkOptions {
    /// Unbounded serial walk from `root`
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            max_depth: None,
            exclude_patterns: Vec::new(),
            workers: 1,
        }
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(path))
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SFTP connection target and credentials
    pub target: SftpTarget,

    /// Local bind host
    pub bind_host: String,

    /// Local bind port
    pub bind_port: u16,

    /// Walk options
    pub walk: WalkOptions,

    /// SFTP sessions in the pool
    pub connections: usize,

    /// Session timeout
    pub timeout: Option<Duration>,

    /// Connection retry count
    pub retry_count: u32,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ServerConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let host = required(args.ssh_host, "SSH host", "ssh-host", "SSH_HOST")?;
        let user = required(args.ssh_user, "SSH user", "ssh-user", "SSH_USER")?;
        let password = required(args.ssh_password, "SSH password", "ssh-password", "SSH_PASSWORD")?;

        if args.connections == 0 || args.connections > MAX_CONNECTIONS {
            return Err(ConfigError::InvalidConnectionCount {
                count: args.connections,
                max: MAX_CONNECTIONS,
            });
        }

        if args.walk_workers == 0 || args.walk_workers > MAX_WALK_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.walk_workers,
                max: MAX_WALK_WORKERS,
            });
        }

        if !args.root.starts_with('/') {
            return Err(ConfigError::InvalidRoot { root: args.root });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = match args.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            target: SftpTarget::new(host, args.ssh_port, user, password),
            bind_host: args.server_host,
            bind_port: args.server_port,
            walk: WalkOptions {
                root: normalize_path(&args.root),
                max_depth: args.max_depth,
                exclude_patterns,
                workers: args.walk_workers,
            },
            connections: args.connections,
            timeout,
            retry_count: args.retries,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// `host:port` the HTTP server binds to
    pub fn bind_display(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// Resolve the bind host (which may be a name like `localhost`)
    pub async fn resolve_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = self.bind_display();
        let mut addrs = tokio::net::lookup_host(addr.clone())
            .await
            .map_err(|e| ConfigError::InvalidBindAddress {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        addrs.next().ok_or_else(|| ConfigError::InvalidBindAddress {
            addr,
            reason: "resolved to no addresses".into(),
        })
    }
}

fn required(
    value: Option<String>,
    name: &'static str,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingSetting { name, flag, env }),
    }
}

/// Default `.env` location (current directory)
pub fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "sftp-image-server",
            "--ssh-host",
            "nas.local",
            "--ssh-user",
            "photos",
            "--ssh-password",
            "secret",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    /// Default value and env var clap declares for an argument
    fn declared(id: &str) -> (Option<String>, Option<String>) {
        let cmd = CliArgs::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id().as_str() == id)
            .unwrap();
        let default = arg
            .get_default_values()
            .first()
            .map(|v| v.to_string_lossy().into_owned());
        let env = arg.get_env().map(|e| e.to_string_lossy().into_owned());
        (default, env)
    }

    #[test]
    fn test_declared_defaults_and_env_names() {
        // Read from the clap definition so the process environment can't leak in
        let expect = |id: &str, default: Option<&str>, env: Option<&str>| {
            assert_eq!(
                declared(id),
                (default.map(String::from), env.map(String::from)),
                "{id}"
            );
        };
        expect("ssh_host", None, Some("SSH_HOST"));
        expect("ssh_port", Some("22"), Some("SSH_PORT"));
        expect("ssh_user", None, Some("SSH_USER"));
        expect("ssh_password", None, Some("SSH_PASSWORD"));
        expect("server_host", Some("localhost"), Some("SERVER_HOST"));
        expect("server_port", Some("3141"), Some("SERVER_PORT"));
        expect("root", Some("/"), Some("IMAGE_ROOT"));
        expect("connections", Some("2"), Some("SFTP_CONNECTIONS"));
        expect("walk_workers", Some("1"), Some("WALK_WORKERS"));
        expect("timeout", Some("30"), Some("SSH_TIMEOUT"));
        expect("retries", Some("3"), Some("SSH_RETRIES"));
        expect("max_depth", None, None);
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs {
            ssh_host: Some("nas.local".into()),
            ssh_port: 22,
            ssh_user: Some("photos".into()),
            ssh_password: Some("secret".into()),
            server_host: "localhost".into(),
            server_port: 3141,
            root: "/".into(),
            connections: 2,
            walk_workers: 1,
            max_depth: None,
            exclude_patterns: Vec::new(),
            timeout: 30,
            retries: 3,
            quiet: false,
            verbose: false,
        };
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.target.port, 22);
        assert_eq!(config.bind_display(), "localhost:3141");
        assert_eq!(config.walk.root, "/");
        assert_eq!(config.walk.workers, 1);
        assert_eq!(config.walk.max_depth, None);
        assert_eq!(config.connections, 2);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.retry_count, 3);
        assert!(config.show_progress);
    }

    #[test]
    fn test_missing_credentials() {
        let mut args = parse(&[]);
        args.ssh_user = None;
        assert!(matches!(
            ServerConfig::from_args(args),
            Err(ConfigError::MissingSetting { env: "SSH_USER", .. })
        ));

        let mut args = parse(&[]);
        args.ssh_password = Some("   ".into());
        assert!(matches!(
            ServerConfig::from_args(args),
            Err(ConfigError::MissingSetting { env: "SSH_PASSWORD", .. })
        ));

        let mut args = parse(&[]);
        args.ssh_host = None;
        assert!(matches!(
            ServerConfig::from_args(args),
            Err(ConfigError::MissingSetting { env: "SSH_HOST", .. })
        ));
    }

    #[test]
    fn test_invalid_counts() {
        assert!(matches!(
            ServerConfig::from_args(parse(&["--connections", "0"])),
            Err(ConfigError::InvalidConnectionCount { .. })
        ));
        assert!(matches!(
            ServerConfig::from_args(parse(&["--walk-workers", "1000"])),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_root_validation() {
        assert!(matches!(
            ServerConfig::from_args(parse(&["--root", "photos"])),
            Err(ConfigError::InvalidRoot { .. })
        ));
        let config = ServerConfig::from_args(parse(&["--root", "/volume1/photos/"])).unwrap();
        assert_eq!(config.walk.root, "/volume1/photos");
    }

    #[test]
    fn test_exclude_pattern() {
        let config =
            ServerConfig::from_args(parse(&["--exclude", r"\.snapshot", "--exclude", "@eaDir"]))
                .unwrap();
        assert!(config.walk.is_excluded("/data/.snapshot/hourly.0"));
        assert!(config.walk.is_excluded("/photos/@eaDir"));
        assert!(!config.walk.is_excluded("/photos/2021"));

        assert!(matches!(
            ServerConfig::from_args(parse(&["--exclude", "("])),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = ServerConfig::from_args(parse(&["--timeout", "0"])).unwrap();
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_env_file(&dir.path().join("absent.env")).unwrap());
    }

    #[tokio::test]
    async fn test_resolve_bind_addr() {
        let mut config = ServerConfig::from_args(parse(&["--host", "127.0.0.1", "--port", "0"])).unwrap();
        let addr = config.resolve_bind_addr().await.unwrap();
        assert!(addr.ip().is_loopback());

        config.bind_host = "not a host name".into();
        assert!(config.resolve_bind_addr().await.is_err());
    }
}
