//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! Every statement is idempotent, so startup can always call
//! [`init_database`].

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Resource types known to the resource tables
pub const RESOURCE_TYPES: &[&str] = &[
    "queue",
    "experiment",
    "model",
    "artifact",
    "plugin",
    "plugin_file",
    "plugin_task_parameter_type",
    "job",
];

/// User lock types
pub const USER_LOCK_TYPES: &[&str] = &["delete", "password"];

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL allows concurrent readers with one writer
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and seed lookup rows
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Users and authentication
    create_users_table(pool).await?;
    create_user_locks_tables(pool).await?;
    create_revoked_tokens_table(pool).await?;

    // Groups and permissions
    create_groups_table(pool).await?;
    create_group_members_table(pool).await?;
    create_group_managers_table(pool).await?;

    // Versioned resources
    create_resource_types_table(pool).await?;
    create_resources_table(pool).await?;
    create_resource_snapshots_table(pool).await?;
    create_tags_tables(pool).await?;

    // Type specific state
    create_queue_locks_table(pool).await?;
    create_model_versions_table(pool).await?;
    create_job_statuses_table(pool).await?;
    create_task_plugins_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            alternative_id TEXT NOT NULL,
            created_on TEXT NOT NULL,
            last_modified_on TEXT NOT NULL,
            last_login_on TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Usernames are unique among live users only
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_live_username ON users (username) WHERE is_deleted = 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_locks_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_lock_types (
            user_lock_type TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    for lock_type in USER_LOCK_TYPES {
        sqlx::query("INSERT OR IGNORE INTO user_lock_types (user_lock_type) VALUES (?)")
            .bind(lock_type)
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_locks (
            user_id INTEGER NOT NULL REFERENCES users (user_id),
            user_lock_type TEXT NOT NULL REFERENCES user_lock_types (user_lock_type),
            created_on TEXT NOT NULL,
            PRIMARY KEY (user_id, user_lock_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_revoked_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revoked_tokens (
            jti TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users (user_id),
            expires_on INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            group_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            creator_id INTEGER NOT NULL REFERENCES users (user_id),
            created_on TEXT NOT NULL,
            last_modified_on TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_groups_live_name ON groups (name) WHERE is_deleted = 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_group_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_members (
            group_id INTEGER NOT NULL REFERENCES groups (group_id),
            user_id INTEGER NOT NULL REFERENCES users (user_id),
            read INTEGER NOT NULL DEFAULT 0,
            write INTEGER NOT NULL DEFAULT 0,
            share_read INTEGER NOT NULL DEFAULT 0,
            share_write INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_group_managers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_managers (
            group_id INTEGER NOT NULL REFERENCES groups (group_id),
            user_id INTEGER NOT NULL REFERENCES users (user_id),
            owner INTEGER NOT NULL DEFAULT 0,
            admin INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_resource_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_types (
            resource_type TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    for resource_type in RESOURCE_TYPES {
        sqlx::query("INSERT OR IGNORE INTO resource_types (resource_type) VALUES (?)")
            .bind(resource_type)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn create_resources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            resource_id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_type TEXT NOT NULL REFERENCES resource_types (resource_type),
            group_id INTEGER NOT NULL REFERENCES groups (group_id),
            parent_id INTEGER REFERENCES resources (resource_id),
            creator_id INTEGER NOT NULL REFERENCES users (user_id),
            created_on TEXT NOT NULL,
            latest_snapshot_id INTEGER,
            is_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resources_type_group ON resources (resource_type, group_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_resource_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_snapshots (
            snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
            resource_id INTEGER NOT NULL REFERENCES resources (resource_id),
            creator_id INTEGER NOT NULL REFERENCES users (user_id),
            created_on TEXT NOT NULL,
            name TEXT,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resource_snapshots_resource ON resource_snapshots (resource_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tags_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id INTEGER NOT NULL REFERENCES groups (group_id),
            creator_id INTEGER NOT NULL REFERENCES users (user_id),
            name TEXT NOT NULL,
            created_on TEXT NOT NULL,
            last_modified_on TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_live_name ON tags (group_id, name) WHERE is_deleted = 0",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_tags (
            resource_id INTEGER NOT NULL REFERENCES resources (resource_id),
            tag_id INTEGER NOT NULL REFERENCES tags (tag_id),
            PRIMARY KEY (resource_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_queue_locks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_locks (
            queue_id INTEGER PRIMARY KEY REFERENCES resources (resource_id),
            created_on TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_model_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_versions (
            model_id INTEGER NOT NULL REFERENCES resources (resource_id),
            version_number INTEGER NOT NULL,
            artifact_id INTEGER NOT NULL REFERENCES resources (resource_id),
            description TEXT NOT NULL DEFAULT '',
            creator_id INTEGER NOT NULL REFERENCES users (user_id),
            created_on TEXT NOT NULL,
            last_modified_on TEXT NOT NULL,
            PRIMARY KEY (model_id, version_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_statuses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_statuses (
            job_id INTEGER PRIMARY KEY REFERENCES resources (resource_id),
            status TEXT NOT NULL,
            last_modified_on TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_task_plugins_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_plugins (
            collection TEXT NOT NULL,
            name TEXT NOT NULL,
            modules TEXT NOT NULL,
            archive BLOB NOT NULL,
            created_on TEXT NOT NULL,
            PRIMARY KEY (collection, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
