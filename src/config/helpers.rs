use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values the same.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// Parse an optional env var into `T`, reporting the key on failure.
pub(crate) fn parse_optional_env<T>(key: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be {expected}: {e}"),
        })
}

/// Parse a boolean flag. Accepts `true`/`false`/`1`/`0`/`yes`/`no`.
pub(crate) fn parse_bool_env(key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = optional_env(key)? else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::sync::Mutex;

    /// Serializes env-mutating tests across the config modules.
    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    pub(crate) fn set(key: &str, value: &str) {
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe { std::env::set_var(key, value) }
    }

    pub(crate) fn remove(key: &str) {
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe { std::env::remove_var(key) }
    }
}
