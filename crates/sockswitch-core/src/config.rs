//! Switch Configuration
//!
//! Loaded from TOML or JSON (picked by file extension). Every field has
//! a default, so a missing file means "defaults".
//!
//! ```toml
//! state_path = "/home/me/.local/share/sockswitch/state.json"
//! platform = "gsettings"
//! default_port = 9999
//! extra_bypass = ["*.corp.example"]
//! log_level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Port offered when neither the user nor the saved state has one
pub const DEFAULT_PROXY_PORT: u16 = 9999;

/// Which host mechanism applies proxy settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Record only; settings are applied elsewhere
    #[default]
    Detached,
    /// GNOME system proxy via `gsettings`
    GSettings,
}

impl std::str::FromStr for PlatformKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "detached" => Ok(PlatformKind::Detached),
            "gsettings" => Ok(PlatformKind::GSettings),
            _ => Err(ConfigError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Where the state record lives
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Proxy settings backend
    #[serde(default)]
    pub platform: PlatformKind,
    /// Port used when none is given
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Extra entries appended to the bypass list
    #[serde(default)]
    pub extra_bypass: Vec<String>,
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("sockswitch-state.json")
}

fn default_port() -> u16 {
    DEFAULT_PROXY_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            platform: PlatformKind::default(),
            default_port: default_port(),
            extra_bypass: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl SwitchConfig {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config = match ext {
            "toml" => Self::from_toml(&content)?,
            "json" => Self::from_json(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.extra_bypass.iter().any(|e| e.trim().is_empty()) {
            return Err(ConfigError::EmptyBypassEntry);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid default port")]
    InvalidPort,

    #[error("Bypass entries must not be empty")]
    EmptyBypassEntry,

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
