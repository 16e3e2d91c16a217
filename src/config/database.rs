use std::path::PathBuf;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let path = optional_env("DATABASE_PATH")?
            .map(PathBuf::from)
            .or_else(|| settings.database_path.clone())
            .unwrap_or_else(default_database_path);
        Ok(Self { path })
    }
}

/// Get the default database path (~/.askbot/askbot.db).
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".askbot")
        .join("askbot.db")
}
