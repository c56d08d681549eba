//! Server configuration.
//!
//! All parameters are static for the lifetime of the process. They are
//! read from an optional TOML file; any field missing from the file takes
//! its default.
//!
//! ```toml
//! profile = "command"
//! port = 8080
//! backlog = 1024
//! idle_timeout_secs = 10
//! chunk_size = 1024
//! max_file_length = 67108864
//! grayscale_dir = "grayscale_images"
//! binary_dir = "binary_images"
//! keep_uploads = false
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use imgsrv_core::CommandTable;
use imgsrv_protocol::DEFAULT_CHUNK_SIZE;

/// Default port of the command profile
pub const DEFAULT_COMMAND_PORT: u16 = 8080;

/// Default port of the byte-ack profile
pub const DEFAULT_BYTE_ACK_PORT: u16 = 2121;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Default upper bound on an uploaded file (64 MiB)
pub const DEFAULT_MAX_FILE_LENGTH: u64 = 64 * 1024 * 1024;

/// Wire protocol variant served on the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Line-oriented command negotiation, result file returned.
    #[default]
    Command,
    /// One upload, grayscale, single status byte reply.
    ByteAck,
}

/// Startup parameters of the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Protocol profile served
    pub profile: Profile,

    /// Address to bind
    pub bind_addr: IpAddr,

    /// Port to bind; the profile's default when unset
    pub port: Option<u16>,

    /// Listen backlog
    pub backlog: u32,

    /// Idle timeout of the command profile, in seconds
    pub idle_timeout_secs: u64,

    /// Idle timeout of the byte-ack profile, in seconds
    pub byte_ack_idle_timeout_secs: u64,

    /// Chunk size for sending result files
    pub chunk_size: usize,

    /// Largest accepted upload, in bytes
    pub max_file_length: u64,

    /// Storage directory of the `gs` command (and the byte-ack profile)
    pub grayscale_dir: PathBuf,

    /// Storage directory of the `bin` command
    pub binary_dir: PathBuf,

    /// Keep the original upload after a successful transform
    pub keep_uploads: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Command,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: None,
            backlog: DEFAULT_BACKLOG,
            idle_timeout_secs: 10,
            byte_ack_idle_timeout_secs: 100,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_length: DEFAULT_MAX_FILE_LENGTH,
            grayscale_dir: PathBuf::from("grayscale_images"),
            binary_dir: PathBuf::from("binary_images"),
            keep_uploads: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parses configuration from TOML text and validates it.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be greater than 0".into()));
        }
        if self.idle_timeout_secs == 0 || self.byte_ack_idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idle timeouts must be greater than 0".into()));
        }
        if self.grayscale_dir.as_os_str().is_empty() || self.binary_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage directories must not be empty".into()));
        }
        Ok(())
    }

    /// Port actually bound, falling back to the profile's default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.profile {
            Profile::Command => DEFAULT_COMMAND_PORT,
            Profile::ByteAck => DEFAULT_BYTE_ACK_PORT,
        })
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port())
    }

    /// Idle timeout of the configured profile.
    pub fn idle_timeout(&self) -> Duration {
        match self.profile {
            Profile::Command => Duration::from_secs(self.idle_timeout_secs),
            Profile::ByteAck => Duration::from_secs(self.byte_ack_idle_timeout_secs),
        }
    }

    /// Builds the `gs`/`bin` command table over the configured directories.
    pub fn command_table(&self) -> CommandTable {
        CommandTable::standard(&self.grayscale_dir, &self.binary_dir)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
