//! Configuration system.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $WRAITH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/wraith/config.toml
//!   3. ~/.config/wraith/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WraithConfig {
    pub identity: IdentityConfig,
    pub relay: RelayConfig,
    pub noise: NoiseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the keystore JSON document. Auto-generated on first run.
    pub keystore_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay websocket URLs to connect to on startup.
    pub urls: Vec<String>,
    /// Initial reconnect backoff, seconds.
    pub reconnect_min_secs: u64,
    /// Reconnect backoff ceiling, seconds.
    pub reconnect_max_secs: u64,
    /// Capacity of the dedup set shared across all relay connections.
    pub dedup_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Default handshake pattern: "XX", "IK", or "NK".
    pub pattern: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for WraithConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            relay: RelayConfig::default(),
            noise: NoiseConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            keystore_path: data_dir().join("keystore.json"),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            reconnect_min_secs: 1,
            reconnect_max_secs: 300,
            dedup_capacity: 10_000,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            pattern: "XX".to_string(),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("wraith")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("wraith")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl WraithConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            WraithConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WRAITH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&WraithConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply `WRAITH_*` env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WRAITH_IDENTITY__KEYSTORE_PATH") {
            self.identity.keystore_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WRAITH_RELAY__URLS") {
            self.relay.urls = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("WRAITH_RELAY__RECONNECT_MIN_SECS") {
            if let Ok(n) = v.parse() {
                self.relay.reconnect_min_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WRAITH_RELAY__RECONNECT_MAX_SECS") {
            if let Ok(n) = v.parse() {
                self.relay.reconnect_max_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WRAITH_RELAY__DEDUP_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.relay.dedup_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("WRAITH_NOISE__PATTERN") {
            self.noise.pattern = v;
        }
    }
}
