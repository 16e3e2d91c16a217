//! Error types for askbot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Failure classes the bot distinguishes when talking to users.
///
/// Wizard input errors are handled locally by re-prompting. Transport,
/// persistence and crypto failures share one generic reply. Not-found and
/// pending are kept apart because they point the user at different fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Pending,
    Unauthorized,
    Transport,
    EmptyAnswer,
    Persistence,
    Crypto,
}

impl ErrorKind {
    /// Text shown to the end user for this class of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NotFound => {
                "Command configuration not found. Try /ls or /ls server to check if the command is set up."
            }
            Self::Pending => {
                "This command is not fully configured yet. Finish its setup with /reg and try again."
            }
            Self::Unauthorized => "You don't have permission to perform this action.",
            Self::EmptyAnswer => "The agent returned an empty response. Please try again.",
            Self::Transport | Self::Persistence | Self::Crypto => {
                "An error occurred. Please try again."
            }
        }
    }
}

impl Error {
    /// Classify this error into the user-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Crypto(_) => ErrorKind::Crypto,
            Self::Database(DatabaseError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::Persistence,
            Self::Channel(_) => ErrorKind::Transport,
            Self::Agent(e) => e.kind(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Chat platform transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to delete message on channel {name}: {reason}")]
    DeleteFailed { name: String, reason: String },

    #[error("Member lookup failed on channel {name}: {reason}")]
    MemberLookupFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Remote agent call errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent endpoint returned unexpected status code: {status}")]
    Transport { status: u16 },

    #[error("Agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no thought found")]
    NoThought,

    #[error("empty response from agent")]
    EmptyAnswer,

    #[error("Invalid agent endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream read error: {0}")]
    Stream(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyAnswer | Self::NoThought => ErrorKind::EmptyAnswer,
            _ => ErrorKind::Transport,
        }
    }
}

/// Credential vault errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption key must decode to exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encryption key is not valid base64: {0}")]
    InvalidKeyEncoding(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_not_found_is_not_found_kind() {
        let err: Error = DatabaseError::not_found("user", 42).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Database error: Entity not found: user with id 42");
    }

    #[test]
    fn transport_style_errors_share_generic_message() {
        let transport: Error = AgentError::Transport { status: 502 }.into();
        let persistence: Error = DatabaseError::Constraint("UNIQUE constraint failed".into()).into();
        let crypto: Error = CryptoError::Encrypt.into();

        for err in [&transport, &persistence, &crypto] {
            assert_eq!(
                err.kind().user_message(),
                "An error occurred. Please try again."
            );
        }
    }

    #[test]
    fn not_found_and_pending_messages_differ() {
        assert_ne!(
            ErrorKind::NotFound.user_message(),
            ErrorKind::Pending.user_message()
        );
    }

    #[test]
    fn empty_answer_is_distinct_from_transport() {
        assert_eq!(AgentError::EmptyAnswer.kind(), ErrorKind::EmptyAnswer);
        assert_eq!(AgentError::NoThought.kind(), ErrorKind::EmptyAnswer);
        assert_eq!(
            AgentError::Transport { status: 500 }.kind(),
            ErrorKind::Transport
        );
    }
}
