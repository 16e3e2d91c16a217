//! Registration wizard.
//!
//! A pending config is filled one field at a time in the user's private chat:
//! command, endpoint URL, API key, description. Which field the next free-text
//! message answers is kept in [`SetupSessions`], keyed by the chat and user
//! the input is expected from. Arming a session replaces whatever was armed
//! for that key before.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::bot::Bot;
use crate::channels::IncomingText;
use crate::db::{ConfigField, Platform, Scope};
use crate::error::{DatabaseError, ErrorKind, Result};

pub(crate) const SETUP_ALREADY_COMPLETE: &str = "Setup is already complete.";
pub(crate) const CONFIG_GONE: &str =
    "This configuration no longer exists. Use /reg to start a new one.";
const INVALID_URL: &str = "Invalid endpoint URL. Please try again.";
const EMPTY_INPUT: &str = "The value can't be empty. Please try again.";
const COMMAND_NOT_ONE_WORD: &str = "The command must be a single word. Please try again.";
const COMMAND_TAKEN: &str = "That command is already in use. Please choose another one.";

/// Where a wizard expects its next input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub platform: Platform,
    pub chat_id: i64,
    pub user_id: i64,
}

impl SessionKey {
    pub fn new(platform: Platform, chat_id: i64, user_id: i64) -> Self {
        Self {
            platform,
            chat_id,
            user_id,
        }
    }

    pub fn for_message(msg: &IncomingText) -> Self {
        Self::new(msg.chat.platform, msg.chat.chat_id, msg.from.user_id)
    }
}

/// An armed capture: the next input for the key fills `step` of `config_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupSession {
    pub config_id: i64,
    pub scope: Scope,
    pub step: ConfigField,
    pub armed_at: Instant,
}

/// Table of armed registration captures, at most one per key.
#[derive(Debug)]
pub struct SetupSessions {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionKey, SetupSession>>,
}

impl SetupSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Arm (or re-arm) the capture for `key`, replacing any previous one.
    pub async fn arm(&self, key: SessionKey, config_id: i64, scope: Scope, step: ConfigField) {
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;
        sessions.retain(|_, s| s.armed_at.elapsed() < ttl);
        sessions.insert(
            key,
            SetupSession {
                config_id,
                scope,
                step,
                armed_at: Instant::now(),
            },
        );
    }

    /// The live capture for `key`. Expired captures are dropped on lookup.
    pub async fn get(&self, key: &SessionKey) -> Option<SetupSession> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(key) {
                None => return None,
                Some(s) if s.armed_at.elapsed() < self.ttl => return Some(*s),
                Some(_) => {}
            }
        }
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(key)
            .is_some_and(|s| s.armed_at.elapsed() >= self.ttl)
        {
            sessions.remove(key);
            tracing::debug!(chat_id = key.chat_id, user_id = key.user_id, "Setup session expired");
        }
        None
    }

    pub async fn retire(&self, key: &SessionKey) -> Option<SetupSession> {
        self.sessions.write().await.remove(key)
    }

    /// Drop every capture bound to one config. Returns how many were armed.
    pub async fn retire_config(&self, scope: Scope, config_id: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.scope == scope && s.config_id == config_id));
        before - sessions.len()
    }
}

/// Result of entering the wizard for one config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStart {
    Prompted(ConfigField),
    AlreadyComplete,
    NotFound,
}

pub(crate) fn prompt(scope: Scope, field: ConfigField) -> &'static str {
    match (field, scope) {
        (ConfigField::Command, Scope::User) => "Please enter the command for this configuration:",
        (ConfigField::Command, Scope::Server) => {
            "Please enter the command for this server configuration:"
        }
        (ConfigField::EndpointUrl, _) => "Please enter the endpoint URL:",
        (ConfigField::ApiKey, Scope::User) => "Please enter your API key:",
        (ConfigField::ApiKey, Scope::Server) => "Please enter the secret token:",
        (ConfigField::Description, _) => "Please enter a description for this configuration:",
    }
}

fn label(field: ConfigField) -> &'static str {
    match field {
        ConfigField::Command => "Command",
        ConfigField::EndpointUrl => "Endpoint URL",
        ConfigField::ApiKey => "API key",
        ConfigField::Description => "Description",
    }
}

fn save_failed(field: ConfigField) -> String {
    let noun = match field {
        ConfigField::Command => "command",
        ConfigField::EndpointUrl => "endpoint URL",
        ConfigField::ApiKey => "API key",
        ConfigField::Description => "description",
    };
    format!("Failed to save {noun}. Please try again.")
}

/// Check one wizard answer. The error is the reply to send.
fn validate(field: ConfigField, input: &str) -> std::result::Result<(), &'static str> {
    if input.is_empty() {
        return Err(EMPTY_INPUT);
    }
    match field {
        ConfigField::Command if input.split_whitespace().nth(1).is_some() => {
            Err(COMMAND_NOT_ONE_WORD)
        }
        ConfigField::EndpointUrl => match url::Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
            _ => Err(INVALID_URL),
        },
        _ => Ok(()),
    }
}

impl Bot {
    /// Enter the wizard for `config_id` in the private chat of `user_id`.
    pub(super) async fn start_setup(
        &self,
        user_id: i64,
        scope: Scope,
        config_id: i64,
    ) -> Result<SetupStart> {
        let chat_id = self.platform.direct_chat_id(user_id);

        let Some(config) = self.store.get_config(scope, config_id).await? else {
            self.say(chat_id, CONFIG_GONE).await;
            return Ok(SetupStart::NotFound);
        };

        let Some(field) = config.next_missing_field() else {
            self.say(chat_id, SETUP_ALREADY_COMPLETE).await;
            return Ok(SetupStart::AlreadyComplete);
        };

        let key = SessionKey::new(self.platform.platform(), chat_id, user_id);
        self.sessions.arm(key, config.id, scope, field).await;
        tracing::debug!(config_id, %scope, ?field, user_id, "Setup capture armed");
        self.say(chat_id, prompt(scope, field)).await;
        Ok(SetupStart::Prompted(field))
    }

    /// Feed free text to an armed wizard. Returns `false` when no capture is
    /// armed for the sender in this chat.
    pub(super) async fn handle_setup_input(&self, msg: &IncomingText) -> Result<bool> {
        let key = SessionKey::for_message(msg);
        let Some(session) = self.sessions.get(&key).await else {
            return Ok(false);
        };

        let chat_id = msg.chat.chat_id;
        let field = session.step;
        let input = msg.text.trim();

        // Any input restarts the clock; the step stays armed until it saves.
        self.sessions
            .arm(key, session.config_id, session.scope, field)
            .await;

        if let Err(reply) = validate(field, input) {
            self.say(chat_id, reply).await;
            return Ok(true);
        }

        let value = if field == ConfigField::ApiKey {
            match self.vault.encrypt(input) {
                Ok(sealed) => sealed,
                Err(e) => {
                    tracing::error!(config_id = session.config_id, "Failed to seal API key: {}", e);
                    self.say(chat_id, ErrorKind::Crypto.user_message()).await;
                    return Ok(true);
                }
            }
        } else {
            input.to_string()
        };

        let updated = match self
            .store
            .update_field(session.scope, session.config_id, field, &value)
            .await
        {
            Ok(config) => config,
            Err(DatabaseError::Constraint(detail)) if field == ConfigField::Command => {
                tracing::info!(config_id = session.config_id, "Command already taken: {}", detail);
                self.say(chat_id, COMMAND_TAKEN).await;
                return Ok(true);
            }
            Err(DatabaseError::NotFound { .. }) => {
                self.sessions.retire(&key).await;
                self.say(chat_id, CONFIG_GONE).await;
                return Ok(true);
            }
            Err(e) => {
                tracing::error!(
                    config_id = session.config_id,
                    ?field,
                    "Failed to save setup field: {}",
                    e
                );
                self.say(chat_id, &save_failed(field)).await;
                return Ok(true);
            }
        };

        if field == ConfigField::ApiKey
            && let Err(e) = self.platform.delete_message(chat_id, msg.message_id).await
        {
            tracing::warn!(chat_id, message_id = msg.message_id, "Failed to delete API key message: {}", e);
        }

        match updated.next_missing_field() {
            Some(next) => {
                self.sessions
                    .arm(key, updated.id, updated.scope, next)
                    .await;
                self.say(chat_id, &format!("{} saved.", label(field))).await;
                self.say(chat_id, prompt(updated.scope, next)).await;
            }
            None => {
                self.sessions.retire(&key).await;
                tracing::info!(
                    config_id = updated.id,
                    scope = %updated.scope,
                    command = %updated.command,
                    "Agent config complete"
                );
                self.say(chat_id, &format!("{} saved. Setup complete.", label(field)))
                    .await;
            }
        }
        Ok(true)
    }
}
