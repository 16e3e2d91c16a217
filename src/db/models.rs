//! Persisted entities.

use chrono::{DateTime, Utc};

/// Chat platform a user or server identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "telegram" => Some(Self::Telegram),
            "discord" => Some(Self::Discord),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub platform_user_id: String,
    pub platform: Platform,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A group (Telegram) or guild (Discord).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: i64,
    pub platform_server_id: String,
    pub platform: Platform,
    pub name: String,
    /// Internal id of the owning [`User`].
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Which kind of entity owns an [`AgentConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    User,
    Server,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Server => "server",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "server" => Some(Self::Server),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four fields the registration wizard fills, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Command,
    EndpointUrl,
    ApiKey,
    Description,
}

impl ConfigField {
    pub const ORDER: [ConfigField; 4] = [
        Self::Command,
        Self::EndpointUrl,
        Self::ApiKey,
        Self::Description,
    ];

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::EndpointUrl => "endpoint_url",
            Self::ApiKey => "api_key",
            Self::Description => "description",
        }
    }
}

/// A command bound to a remote agent endpoint, owned by a user or a server.
///
/// `api_key` always holds vault ciphertext, never the plaintext key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub id: i64,
    pub scope: Scope,
    pub owner_id: i64,
    pub command: String,
    pub endpoint_url: String,
    pub api_key: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentConfig {
    pub fn field(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::Command => &self.command,
            ConfigField::EndpointUrl => &self.endpoint_url,
            ConfigField::ApiKey => &self.api_key,
            ConfigField::Description => &self.description,
        }
    }

    /// First unfilled field in wizard order, or `None` once complete.
    pub fn next_missing_field(&self) -> Option<ConfigField> {
        ConfigField::ORDER
            .into_iter()
            .find(|f| self.field(*f).is_empty())
    }

    pub fn is_pending(&self) -> bool {
        self.next_missing_field().is_some()
    }

    pub fn is_complete(&self) -> bool {
        !self.is_pending()
    }

    /// Whether the resolver may hand this config to an invocation.
    pub fn is_invocable(&self) -> bool {
        !self.command.is_empty() && !self.endpoint_url.is_empty() && !self.api_key.is_empty()
    }
}
