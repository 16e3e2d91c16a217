//! libSQL backend for the ConfigStore trait.
//!
//! Embedded SQLite-compatible database, one file on local disk.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase};

use crate::db::ids::IdGenerators;
use crate::db::libsql_migrations;
use crate::db::{AgentConfig, ConfigField, ConfigStore, Platform, Scope, Server, User};
use crate::error::DatabaseError;

/// Explicit column list for users (matches positional access in `row_to_user`).
const USER_COLUMNS: &str = "id, platform_user_id, platform, username, created_at";

/// Explicit column list for servers (matches positional access in `row_to_server`).
const SERVER_COLUMNS: &str = "id, platform_server_id, platform, name, owner_id, created_at";

/// Explicit column list for both config tables (matches `row_to_config`).
const CONFIG_COLUMNS: &str = "\
    id, owner_id, command, endpoint_url, api_key, description, \
    is_active, created_at, updated_at";

fn config_table(scope: Scope) -> &'static str {
    match scope {
        Scope::User => "user_agent_configs",
        Scope::Server => "server_admin_configs",
    }
}

/// SQL predicate selecting rows with at least one unfilled wizard field.
const PENDING_PREDICATE: &str =
    "(c.command = '' OR c.endpoint_url = '' OR c.api_key = '' OR c.description = '')";

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
    ids: IdGenerators,
}

impl LibSqlBackend {
    /// Create a new local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {}", e))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            ids: IdGenerators::default(),
        })
    }

    /// Create a new connection to the database.
    ///
    /// Sets `PRAGMA busy_timeout = 5000` on every connection so concurrent
    /// writers wait instead of failing with "database is locked".
    pub async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {}", e)))?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to set busy_timeout: {}", e)))?;
        Ok(conn)
    }

    fn next_config_id(&self, scope: Scope) -> i64 {
        match scope {
            Scope::User => self.ids.user_configs.next_id(),
            Scope::Server => self.ids.server_configs.next_id(),
        }
    }

    async fn query_configs(
        &self,
        scope: Scope,
        sql: &str,
        params: impl libsql::params::IntoParams + Send,
    ) -> Result<Vec<AgentConfig>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_config(&row, scope));
        }
        Ok(out)
    }
}

// ==================== Helper functions ====================

/// Parse an ISO-8601 timestamp string from SQLite into DateTime<Utc>.
///
/// Accepts RFC 3339 (our canonical write format) and the naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` form SQLite's own `datetime()` produces.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    Err(format!("unparseable timestamp: {:?}", s))
}

/// Format a DateTime<Utc> for SQLite storage (RFC 3339 with millisecond precision).
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Extract a text column from a libsql Row, returning empty string for NULL.
pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

/// Extract an i64 column, defaulting to 0.
pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or(0)
}

/// Parse a timestamp from a text column.
///
/// If the column is NULL or the value cannot be parsed, logs a warning and
/// returns the Unix epoch so the problem is detectable.
pub(crate) fn get_ts(row: &libsql::Row, idx: i32) -> DateTime<Utc> {
    match row.get::<String>(idx) {
        Ok(s) => match parse_timestamp(&s) {
            Ok(dt) => dt,
            Err(e) => {
                tracing::warn!("Timestamp parse failure at column {}: {}", idx, e);
                DateTime::UNIX_EPOCH
            }
        },
        Err(_) => DateTime::UNIX_EPOCH,
    }
}

fn get_platform(row: &libsql::Row, idx: i32) -> Platform {
    let raw = get_text(row, idx);
    Platform::parse(&raw).unwrap_or_else(|| {
        tracing::warn!("Unknown platform {:?} at column {}", raw, idx);
        Platform::Telegram
    })
}

fn row_to_user(row: &libsql::Row) -> User {
    User {
        id: get_i64(row, 0),
        platform_user_id: get_text(row, 1),
        platform: get_platform(row, 2),
        username: get_text(row, 3),
        created_at: get_ts(row, 4),
    }
}

fn row_to_server(row: &libsql::Row) -> Server {
    Server {
        id: get_i64(row, 0),
        platform_server_id: get_text(row, 1),
        platform: get_platform(row, 2),
        name: get_text(row, 3),
        owner_id: get_i64(row, 4),
        created_at: get_ts(row, 5),
    }
}

fn row_to_config(row: &libsql::Row, scope: Scope) -> AgentConfig {
    AgentConfig {
        id: get_i64(row, 0),
        scope,
        owner_id: get_i64(row, 1),
        command: get_text(row, 2),
        endpoint_url: get_text(row, 3),
        api_key: get_text(row, 4),
        description: get_text(row, 5),
        is_active: get_i64(row, 6) != 0,
        created_at: get_ts(row, 7),
        updated_at: get_ts(row, 8),
    }
}

/// Map a write error, singling out uniqueness violations.
fn map_write_error(e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(msg)
    } else {
        DatabaseError::LibSql(e)
    }
}

/// `is_active` expression for an UPDATE that sets `field` to `?1`.
///
/// SET expressions see the pre-update row, so the column being written is
/// checked through its new value instead.
fn completion_expr(field: ConfigField) -> String {
    let checks: Vec<String> = ConfigField::ORDER
        .iter()
        .map(|f| {
            if *f == field {
                "?1 <> ''".to_string()
            } else {
                format!("{} <> ''", f.column())
            }
        })
        .collect();
    format!(
        "CASE WHEN {} THEN 1 ELSE is_active END",
        checks.join(" AND ")
    )
}

#[async_trait]
impl ConfigStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        // WAL mode persists in the database file: all future connections benefit.
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("Failed to enable WAL mode: {}", e)))?;
        conn.execute_batch(libsql_migrations::SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(format!("libSQL migration failed: {}", e)))?;
        Ok(())
    }

    async fn get_or_create_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
        username: &str,
    ) -> Result<User, DatabaseError> {
        let conn = self.connect().await?;
        let now = fmt_ts(&Utc::now());
        conn.execute(
            r#"
            INSERT INTO users (id, platform_user_id, platform, username, created_at, last_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (platform_user_id, platform)
            DO UPDATE SET username = excluded.username, last_active = excluded.last_active
            "#,
            libsql::params![
                self.ids.users.next_id(),
                platform_user_id,
                platform.as_str(),
                username,
                now
            ],
        )
        .await
        .map_err(map_write_error)?;

        self.get_user_by_platform_id(platform, platform_user_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("user", platform_user_id))
    }

    async fn get_user_by_platform_id(
        &self,
        platform: Platform,
        platform_user_id: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE platform_user_id = ?1 AND platform = ?2"
                ),
                libsql::params![platform_user_id, platform.as_str()],
            )
            .await?;
        Ok(rows.next().await?.map(|row| row_to_user(&row)))
    }

    async fn get_or_create_server(
        &self,
        platform: Platform,
        platform_server_id: &str,
        name: &str,
        owner_id: i64,
    ) -> Result<Server, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO servers (id, platform_server_id, platform, name, owner_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (platform_server_id, platform)
            DO UPDATE SET name = excluded.name
            "#,
            libsql::params![
                self.ids.servers.next_id(),
                platform_server_id,
                platform.as_str(),
                name,
                owner_id,
                fmt_ts(&Utc::now())
            ],
        )
        .await
        .map_err(map_write_error)?;

        self.get_server_by_platform_id(platform, platform_server_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("server", platform_server_id))
    }

    async fn get_server(&self, id: i64) -> Result<Option<Server>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1"),
                libsql::params![id],
            )
            .await?;
        Ok(rows.next().await?.map(|row| row_to_server(&row)))
    }

    async fn get_server_by_platform_id(
        &self,
        platform: Platform,
        platform_server_id: &str,
    ) -> Result<Option<Server>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SERVER_COLUMNS} FROM servers WHERE platform_server_id = ?1 AND platform = ?2"
                ),
                libsql::params![platform_server_id, platform.as_str()],
            )
            .await?;
        Ok(rows.next().await?.map(|row| row_to_server(&row)))
    }

    async fn list_servers_by_owner(&self, owner_id: i64) -> Result<Vec<Server>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE owner_id = ?1 ORDER BY id"),
                libsql::params![owner_id],
            )
            .await?;
        let mut servers = Vec::new();
        while let Some(row) = rows.next().await? {
            servers.push(row_to_server(&row));
        }
        Ok(servers)
    }

    async fn create_config(
        &self,
        scope: Scope,
        owner_id: i64,
    ) -> Result<AgentConfig, DatabaseError> {
        let id = self.next_config_id(scope);
        let now = fmt_ts(&Utc::now());
        let conn = self.connect().await?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, owner_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                config_table(scope)
            ),
            libsql::params![id, owner_id, now],
        )
        .await
        .map_err(map_write_error)?;

        tracing::debug!(config_id = id, %scope, owner_id, "Created pending agent config");
        self.get_config(scope, id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("agent_config", id))
    }

    async fn get_config(&self, scope: Scope, id: i64) -> Result<Option<AgentConfig>, DatabaseError> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM {} WHERE id = ?1",
            config_table(scope)
        );
        Ok(self
            .query_configs(scope, &sql, libsql::params![id])
            .await?
            .into_iter()
            .next())
    }

    async fn get_config_by_command(
        &self,
        scope: Scope,
        owner_id: i64,
        command: &str,
    ) -> Result<Option<AgentConfig>, DatabaseError> {
        if command.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM {} WHERE owner_id = ?1 AND command = ?2",
            config_table(scope)
        );
        Ok(self
            .query_configs(scope, &sql, libsql::params![owner_id, command])
            .await?
            .into_iter()
            .next())
    }

    async fn list_configs_by_owner(
        &self,
        scope: Scope,
        owner_id: i64,
    ) -> Result<Vec<AgentConfig>, DatabaseError> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM {} WHERE owner_id = ?1 ORDER BY id",
            config_table(scope)
        );
        self.query_configs(scope, &sql, libsql::params![owner_id])
            .await
    }

    async fn list_pending_by_user(
        &self,
        scope: Scope,
        user_id: i64,
    ) -> Result<Vec<AgentConfig>, DatabaseError> {
        let columns = CONFIG_COLUMNS
            .split(',')
            .map(|c| format!("c.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = match scope {
            Scope::User => format!(
                "SELECT {columns} FROM user_agent_configs c \
                 WHERE c.owner_id = ?1 AND {PENDING_PREDICATE} ORDER BY c.id"
            ),
            Scope::Server => format!(
                "SELECT {columns} FROM server_admin_configs c \
                 JOIN servers s ON s.id = c.owner_id \
                 WHERE s.owner_id = ?1 AND {PENDING_PREDICATE} ORDER BY c.id"
            ),
        };
        self.query_configs(scope, &sql, libsql::params![user_id])
            .await
    }

    async fn update_field(
        &self,
        scope: Scope,
        id: i64,
        field: ConfigField,
        value: &str,
    ) -> Result<AgentConfig, DatabaseError> {
        let sql = format!(
            "UPDATE {table} SET {column} = ?1, updated_at = ?2, is_active = {active} WHERE id = ?3",
            table = config_table(scope),
            column = field.column(),
            active = completion_expr(field),
        );
        let conn = self.connect().await?;
        let affected = conn
            .execute(&sql, libsql::params![value, fmt_ts(&Utc::now()), id])
            .await
            .map_err(map_write_error)?;
        if affected == 0 {
            return Err(DatabaseError::not_found("agent_config", id));
        }

        self.get_config(scope, id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("agent_config", id))
    }

    async fn delete_config(&self, scope: Scope, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", config_table(scope)),
                libsql::params![id],
            )
            .await?;
        Ok(affected > 0)
    }
}
