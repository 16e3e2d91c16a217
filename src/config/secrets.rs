use secrecy::SecretString;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

/// Key material for the credential vault.
#[derive(Debug, Clone)]
pub struct SecretsConfig {
    /// Base64 encoding of the 32-byte key. Decoded and checked by the vault.
    pub encryption_key: SecretString,
}

impl SecretsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let key = optional_env("ENCRYPTION_KEY")?.ok_or_else(|| ConfigError::MissingRequired {
            key: "ENCRYPTION_KEY".to_string(),
            hint: "Generate one with `askbot generate-key`.".to_string(),
        })?;
        Ok(Self {
            encryption_key: SecretString::from(key),
        })
    }
}
