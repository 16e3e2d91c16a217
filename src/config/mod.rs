//! Configuration for askbot.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! `./.env` and `~/.askbot/.env` are loaded via dotenvy before anything
//! is resolved, so values there behave like real env vars.

mod agent;
mod channels;
mod database;
pub(crate) mod helpers;
mod secrets;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::settings::Settings;

pub use self::agent::{AgentConfig, DefaultAgentConfig, SetupConfig};
pub use self::channels::{ChannelsConfig, HealthConfig, TelegramConfig};
pub use self::database::{DatabaseConfig, default_database_path};
pub use self::secrets::SecretsConfig;

/// Main configuration for the bot.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub channels: ChannelsConfig,
    pub agent: AgentConfig,
    pub setup: SetupConfig,
    pub secrets: SecretsConfig,
    pub health: HealthConfig,
}

impl Config {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    ///
    /// If `toml_path` is `Some`, the file must exist. If `None`, the default
    /// `~/.askbot/config.toml` is used when present.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_askbot_env();

        let settings = Self::load_settings(toml_path)?;
        Self::build(&settings)
    }

    fn load_settings(explicit_path: Option<&Path>) -> Result<Settings, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(settings)
            }
            Ok(None) if explicit_path.is_some() => Err(ConfigError::ParseError(format!(
                "Config file not found: {}",
                path.display()
            ))),
            Ok(None) => Ok(Settings::default()),
            Err(e) if explicit_path.is_some() => Err(e),
            Err(e) => {
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(Settings::default())
            }
        }
    }

    /// Build config from already-loaded settings.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            channels: ChannelsConfig::resolve(settings)?,
            agent: AgentConfig::resolve(settings)?,
            setup: SetupConfig::resolve(settings)?,
            secrets: SecretsConfig::resolve()?,
            health: HealthConfig::resolve(settings)?,
        })
    }
}
