//! Uploaded task plugin packages

use chrono::{DateTime, Utc};
use dioptra_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Task plugin without its archive bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPluginRecord {
    pub collection: String,
    pub name: String,
    pub modules: Vec<String>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TaskPluginRecord> {
    let modules: String = row.get("modules");
    Ok(TaskPluginRecord {
        collection: row.get("collection"),
        name: row.get("name"),
        modules: serde_json::from_str(&modules)
            .map_err(|e| Error::Internal(format!("Corrupt module list: {}", e)))?,
    })
}

/// All task plugins, optionally limited to one collection
pub async fn list(pool: &SqlitePool, collection: Option<&str>) -> Result<Vec<TaskPluginRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT collection, name, modules FROM task_plugins
        WHERE ? IS NULL OR collection = ?
        ORDER BY collection, name
        "#,
    )
    .bind(collection)
    .bind(collection)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn get(pool: &SqlitePool, collection: &str, name: &str) -> Result<Option<TaskPluginRecord>> {
    let row = sqlx::query("SELECT collection, name, modules FROM task_plugins WHERE collection = ? AND name = ?")
        .bind(collection)
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// Store a new task plugin; an existing (collection, name) is an error
pub async fn insert(
    pool: &SqlitePool,
    record: &TaskPluginRecord,
    archive: &[u8],
    now: DateTime<Utc>,
) -> Result<()> {
    let modules = serde_json::to_string(&record.modules)
        .map_err(|e| Error::Internal(format!("Failed to encode module list: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO task_plugins (collection, name, modules, archive, created_on)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.collection)
    .bind(&record.name)
    .bind(modules)
    .bind(archive)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidInput(format!(
            "Task plugin {}/{} already exists",
            record.collection, record.name
        )));
    }
    Ok(())
}

/// Remove a task plugin; false when it did not exist
pub async fn delete(pool: &SqlitePool, collection: &str, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM task_plugins WHERE collection = ? AND name = ?")
        .bind(collection)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
