//! Persistence for users, servers and agent configs.
//!
//! The bot talks to storage only through [`ConfigStore`]; the libSQL backend
//! is the one shipped implementation.

pub mod ids;
pub mod libsql;
pub mod libsql_migrations;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;

pub use self::models::{AgentConfig, ConfigField, Platform, Scope, Server, User};

/// Keyed record store for identities and agent configs.
///
/// Config operations take a [`Scope`] so user and server configs share one
/// code path; `owner_id` is a user id for [`Scope::User`] and a server id for
/// [`Scope::Server`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ==================== Users ====================

    /// Insert the user if unknown, otherwise refresh its username.
    async fn get_or_create_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
        username: &str,
    ) -> Result<User, DatabaseError>;

    async fn get_user_by_platform_id(
        &self,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<Option<User>, DatabaseError>;

    // ==================== Servers ====================

    /// Insert the server if unknown. An existing server keeps its owner.
    async fn get_or_create_server(
        &self,
        platform: Platform,
        platform_server_id: &str,
        name: &str,
        owner_id: i64,
    ) -> Result<Server, DatabaseError>;

    async fn get_server(&self, id: i64) -> Result<Option<Server>, DatabaseError>;

    async fn get_server_by_platform_id(
        &self,
        platform: Platform,
        platform_server_id: &str,
    ) -> Result<Option<Server>, DatabaseError>;

    async fn list_servers_by_owner(&self, owner_id: i64) -> Result<Vec<Server>, DatabaseError>;

    // ==================== Agent configs ====================

    /// Create an empty (pending) config for `owner_id`.
    async fn create_config(&self, scope: Scope, owner_id: i64)
    -> Result<AgentConfig, DatabaseError>;

    async fn get_config(&self, scope: Scope, id: i64) -> Result<Option<AgentConfig>, DatabaseError>;

    async fn get_config_by_command(
        &self,
        scope: Scope,
        owner_id: i64,
        command: &str,
    ) -> Result<Option<AgentConfig>, DatabaseError>;

    /// Every config of one owner, pending or complete, oldest first.
    async fn list_configs_by_owner(
        &self,
        scope: Scope,
        owner_id: i64,
    ) -> Result<Vec<AgentConfig>, DatabaseError>;

    /// Pending configs reachable from a user: their own for [`Scope::User`],
    /// those of servers they own for [`Scope::Server`].
    async fn list_pending_by_user(
        &self,
        scope: Scope,
        user_id: i64,
    ) -> Result<Vec<AgentConfig>, DatabaseError>;

    /// Set one field and return the updated row. Filling the last empty
    /// field marks the config active in the same write.
    async fn update_field(
        &self,
        scope: Scope,
        id: i64,
        field: ConfigField,
        value: &str,
    ) -> Result<AgentConfig, DatabaseError>;

    /// Returns `false` when no such config existed.
    async fn delete_config(&self, scope: Scope, id: i64) -> Result<bool, DatabaseError>;
}

/// Open the configured database and apply migrations.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn ConfigStore>, DatabaseError> {
    let backend = self::libsql::LibSqlBackend::new_local(&config.path).await?;
    backend.run_migrations().await?;
    tracing::info!(path = %config.path.display(), "Database ready");
    Ok(Arc::new(backend))
}
