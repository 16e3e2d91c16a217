use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Remote agent call and orchestration settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on one remote agent call, including the streamed body.
    pub timeout: Duration,
    /// How long an invocation may run before the "thinking" placeholder is shown.
    pub thinking_delay: Duration,
    /// Value sent in the `user` field of every agent request.
    pub user_tag: String,
    /// Agent used by `/ask`, when configured.
    pub default_agent: Option<DefaultAgentConfig>,
}

#[derive(Debug, Clone)]
pub struct DefaultAgentConfig {
    pub endpoint_url: String,
    pub token: SecretString,
}

/// Registration session settings.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Armed registration sessions expire after this long without input.
    pub session_ttl: Duration,
}

impl AgentConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let timeout_secs = parse_optional_env::<u64>("AGENT_TIMEOUT_SECS", "a whole number of seconds")?
            .or(settings.agent.timeout_secs)
            .unwrap_or(300);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let thinking_delay_ms =
            parse_optional_env::<u64>("AGENT_THINKING_DELAY_MS", "a whole number of milliseconds")?
                .or(settings.agent.thinking_delay_ms)
                .unwrap_or(1000);

        let default_url = optional_env("AGENT_URL")?.or_else(|| settings.agent.default_url.clone());
        let default_token = optional_env("AGENT_TOKEN")?;
        let default_agent = match (default_url, default_token) {
            (Some(endpoint_url), Some(token)) => Some(DefaultAgentConfig {
                endpoint_url,
                token: SecretString::from(token),
            }),
            (Some(_), None) => {
                return Err(ConfigError::MissingRequired {
                    key: "AGENT_TOKEN".to_string(),
                    hint: "AGENT_URL is set, so /ask also needs its bearer token.".to_string(),
                });
            }
            _ => None,
        };

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            thinking_delay: Duration::from_millis(thinking_delay_ms),
            user_tag: optional_env("AGENT_USER_TAG")?
                .or_else(|| settings.agent.user_tag.clone())
                .unwrap_or_else(|| "ask".to_string()),
            default_agent,
        })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            thinking_delay: Duration::from_secs(1),
            user_tag: "ask".to_string(),
            default_agent: None,
        }
    }
}

impl SetupConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let ttl = parse_optional_env::<u64>("SETUP_SESSION_TTL_SECS", "a whole number of seconds")?
            .or(settings.setup.session_ttl_secs)
            .unwrap_or(900);
        if ttl == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SETUP_SESSION_TTL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            session_ttl: Duration::from_secs(ttl),
        })
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(900),
        }
    }
}
