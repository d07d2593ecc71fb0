//! Client configuration (config.toml in the platform config directory)
//!
//! Holds the target peer and the input settings the UI layer hands to the
//! session. Settings are stored in TOML format.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use touchlink_shared::DEFAULT_PORT;

/// Config file name inside [`config_dir`]
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ClientConfig`]
    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The configuration could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// No home directory to derive the config directory from
    #[error("no platform config directory available")]
    NoConfigDir,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    /// Peer to connect to
    #[serde(default)]
    pub server: ServerConfig,
    /// Input settings
    #[serde(default)]
    pub input: InputConfig,
}

/// Target peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address (empty until the user enters one)
    #[serde(default)]
    pub host: String,
    /// UDP port (default: 9527)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Input settings consumed by the session and the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Binary encoding plus joystick throttling (default: false)
    #[serde(default)]
    pub extreme_mode: bool,
    /// Joystick smoothing factor for the UI layer (default: 0.4, range: 0-1)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_smoothing() -> f32 {
    0.4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extreme_mode: false,
            smoothing: default_smoothing(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, or `None` when no host is set
    pub fn address(&self) -> Option<String> {
        let host = self.host.trim();
        if host.is_empty() {
            None
        } else {
            Some(format!("{}:{}", host, self.port))
        }
    }
}

impl InputConfig {
    /// Smoothing factor clamped to [0, 1] (NaN falls back to the default)
    pub fn smoothing(&self) -> f32 {
        if self.smoothing.is_nan() {
            default_smoothing()
        } else {
            self.smoothing.clamp(0.0, 1.0)
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\touchlink\config`
/// On macOS: `~/Library/Application Support/io.touchlink.touchlink`
/// On Linux: `~/.config/touchlink`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "touchlink", "touchlink")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of the config file, if a config directory exists
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

impl ClientConfig {
    /// Loads the configuration from the platform config directory.
    ///
    /// Returns default values if the file doesn't exist or cannot be parsed.
    pub fn load() -> Self {
        config_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Loads the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Saves the configuration to the platform config directory.
    ///
    /// Creates the directory if it doesn't exist. Returns the written path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Saves the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }
}
