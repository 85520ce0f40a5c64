//! TOML-based configuration persistence for a discovery node.
//!
//! Reads `NodeConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\P2PLocate\config.toml`
//! - Linux:    `~/.config/p2plocate/config.toml`
//! - macOS:    `~/Library/Application Support/P2PLocate/config.toml`
//!
//! A different file can be read with [`load_config_from`], and
//! [`save_config_to`] writes a config to any path.
//!
//! # Example file
//!
//! ```toml
//! [node]
//! functions = ["print", "scan"]
//! log_level = "debug"
//!
//! [network]
//! port = 20400
//! broadcast_address = "192.168.1.255"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` helper and both sections are
//! optional, so an empty file, a file from an older version, or no file at all
//! all produce a working configuration.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::identity::DEFAULT_IDENTITY_FILE;
use crate::infrastructure::network::server::{ServerConfig, DEFAULT_DISCOVERY_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// Identity and advertised capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Fixed client id.  When absent the id comes from `identity_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Functions this node advertises.
    #[serde(default)]
    pub functions: Vec<String>,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// File the generated client id is persisted to.
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
}

/// Port, destination and timing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// UDP port for discovery traffic, both listening and sending.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Destination for Discover datagrams.  Detected from the local
    /// interfaces when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_address: Option<Ipv4Addr>,
    /// Delay between start and the first self-announcement.
    #[serde(default = "default_announce_delay_ms")]
    pub announce_delay_ms: u64,
    /// Quiet period that ends a burst of newly discovered peers.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_identity_file() -> PathBuf {
    PathBuf::from(DEFAULT_IDENTITY_FILE)
}
fn default_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_announce_delay_ms() -> u64 {
    1000
}
fn default_debounce_ms() -> u64 {
    500
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            client_id: None,
            functions: Vec::new(),
            log_level: default_log_level(),
            identity_file: default_identity_file(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast_address: None,
            announce_delay_ms: default_announce_delay_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl NodeConfig {
    /// Builds the discovery server parameters described by this config.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.network.port,
            client_id: self.node.client_id.clone(),
            functions: self.node.functions.clone(),
            broadcast_address: self.network.broadcast_address,
            announce_delay: Duration::from_millis(self.network.announce_delay_ms),
            debounce_window: Duration::from_millis(self.network.debounce_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `NodeConfig` from the platform config file, returning
/// `NodeConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `NodeConfig` from `path`, returning `NodeConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<NodeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &NodeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `P2PLocate` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("P2PLocate"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("p2plocate"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("P2PLocate")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
