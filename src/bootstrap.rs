//! Bootstrap helpers for askbot.
//!
//! File: `~/.askbot/.env` (standard dotenvy format)

use std::path::PathBuf;

/// Path to the askbot-specific `.env` file: `~/.askbot/.env`.
pub fn askbot_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".askbot")
        .join(".env")
}

/// Load env vars from `~/.askbot/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority. dotenvy never overwrites existing env vars, so the
/// effective priority is:
///
///   explicit env vars > `./.env` > `~/.askbot/.env`
pub fn load_askbot_env() {
    let path = askbot_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_lives_under_askbot_dir() {
        let path = askbot_env_path();
        assert!(path.ends_with(".askbot/.env"));
    }
}
