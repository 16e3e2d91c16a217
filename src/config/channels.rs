use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// Chat platform configuration.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    /// `None` when the Telegram channel is disabled.
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

/// `/healthz` endpoint configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl ChannelsConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let enabled = parse_bool_env("TELEGRAM_ENABLED")?
            .or(settings.telegram.enabled)
            .unwrap_or(true);
        if !enabled {
            return Ok(Self { telegram: None });
        }

        let bot_token =
            optional_env("TELEGRAM_BOT_TOKEN")?.ok_or_else(|| ConfigError::MissingRequired {
                key: "TELEGRAM_BOT_TOKEN".to_string(),
                hint: "Create a bot with @BotFather or set TELEGRAM_ENABLED=false.".to_string(),
            })?;

        let api_base_url = optional_env("TELEGRAM_API_BASE_URL")?
            .or_else(|| settings.telegram.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE_URL.to_string());

        let poll_timeout_secs =
            parse_optional_env::<u64>("TELEGRAM_POLL_TIMEOUT_SECS", "a whole number of seconds")?
                .or(settings.telegram.poll_timeout_secs)
                .unwrap_or(30);
        if poll_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TELEGRAM_POLL_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            telegram: Some(TelegramConfig {
                bot_token: SecretString::from(bot_token),
                api_base_url: api_base_url.trim_end_matches('/').to_string(),
                poll_timeout_secs,
            }),
        })
    }
}

impl HealthConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool_env("HEALTH_ENABLED")?
                .or(settings.health.enabled)
                .unwrap_or(true),
            host: optional_env("HEALTH_HOST")?
                .or_else(|| settings.health.host.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_optional_env::<u16>("HEALTH_PORT", "a valid port number")?
                .or(settings.health.port)
                .unwrap_or(8080),
        })
    }
}
