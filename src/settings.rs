//! File-backed settings.
//!
//! An optional TOML file supplies values that environment variables do not.
//! Every field is optional; absent fields fall through to built-in defaults.
//!
//! ```toml
//! database_path = "/var/lib/askbot/askbot.db"
//!
//! [telegram]
//! enabled = true
//! poll_timeout_secs = 30
//!
//! [agent]
//! timeout_secs = 300
//! thinking_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database_path: Option<PathBuf>,
    pub telegram: TelegramSettings,
    pub agent: AgentSettings,
    pub setup: SetupSettings,
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: Option<bool>,
    pub api_base_url: Option<String>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub timeout_secs: Option<u64>,
    pub thinking_delay_ms: Option<u64>,
    pub user_tag: Option<String>,
    /// Default agent for `/ask`. The token is never read from the file.
    pub default_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SetupSettings {
    pub session_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthSettings {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Settings {
    /// Default TOML location: `~/.askbot/config.toml`.
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".askbot")
            .join("config.toml")
    }

    /// Load settings from a TOML file. Returns `Ok(None)` if the file does not exist.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::from_toml_str(&raw)
            .map(Some)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}
