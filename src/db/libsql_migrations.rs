//! SQLite-dialect schema for the libSQL backend.
//!
//! Every statement is idempotent so `run_migrations` can run on each start.

pub const SCHEMA: &str = r#"

-- ==================== Identities ====================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    platform_user_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    username TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_active TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (platform_user_id, platform)
);

CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY,
    platform_server_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (platform_server_id, platform)
);

CREATE INDEX IF NOT EXISTS idx_servers_owner ON servers(owner_id);

-- ==================== Agent configs ====================

CREATE TABLE IF NOT EXISTS user_agent_configs (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    command TEXT NOT NULL DEFAULT '',
    endpoint_url TEXT NOT NULL DEFAULT '',
    api_key TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_user_agent_configs_command
    ON user_agent_configs(owner_id, command) WHERE command <> '';

CREATE TABLE IF NOT EXISTS server_admin_configs (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
    command TEXT NOT NULL DEFAULT '',
    endpoint_url TEXT NOT NULL DEFAULT '',
    api_key TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_server_admin_configs_command
    ON server_admin_configs(owner_id, command) WHERE command <> '';
"#;
