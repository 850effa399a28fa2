//! Registered versions of a model

use chrono::{DateTime, Utc};
use dioptra_common::Result;
use sqlx::SqlitePool;

/// `model_versions` row joined with its creator
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VersionRecord {
    pub model_id: i64,
    pub version_number: i64,
    pub artifact_id: i64,
    pub description: String,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
}

const VERSION_SELECT: &str = r#"
    SELECT v.model_id, v.version_number, v.artifact_id, v.description,
           v.creator_id, u.username AS creator_username,
           v.created_on, v.last_modified_on
    FROM model_versions v
    JOIN users u ON u.user_id = v.creator_id
"#;

pub async fn get(pool: &SqlitePool, model_id: i64, version_number: i64) -> Result<Option<VersionRecord>> {
    let sql = format!("{} WHERE v.model_id = ? AND v.version_number = ?", VERSION_SELECT);
    let version = sqlx::query_as::<_, VersionRecord>(&sql)
        .bind(model_id)
        .bind(version_number)
        .fetch_optional(pool)
        .await?;
    Ok(version)
}

/// Highest numbered version of a model
pub async fn latest(pool: &SqlitePool, model_id: i64) -> Result<Option<VersionRecord>> {
    let sql = format!(
        "{} WHERE v.model_id = ? ORDER BY v.version_number DESC LIMIT 1",
        VERSION_SELECT
    );
    let version = sqlx::query_as::<_, VersionRecord>(&sql)
        .bind(model_id)
        .fetch_optional(pool)
        .await?;
    Ok(version)
}

/// Page of a model's versions, lowest number first
pub async fn list(
    pool: &SqlitePool,
    model_id: i64,
    offset: i64,
    limit: i64,
) -> Result<(Vec<VersionRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_versions WHERE model_id = ?")
        .bind(model_id)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "{} WHERE v.model_id = ? ORDER BY v.version_number LIMIT ? OFFSET ?",
        VERSION_SELECT
    );
    let versions = sqlx::query_as::<_, VersionRecord>(&sql)
        .bind(model_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((versions, total))
}

/// Register the next version, numbered one past the current highest
pub async fn create(
    pool: &SqlitePool,
    model_id: i64,
    artifact_id: i64,
    description: &str,
    creator_id: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let version_number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM model_versions WHERE model_id = ?",
    )
    .bind(model_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO model_versions (
            model_id, version_number, artifact_id, description,
            creator_id, created_on, last_modified_on
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(model_id)
    .bind(version_number)
    .bind(artifact_id)
    .bind(description)
    .bind(creator_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(version_number)
}

pub async fn set_description(
    pool: &SqlitePool,
    model_id: i64,
    version_number: i64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE model_versions SET description = ?, last_modified_on = ?
        WHERE model_id = ? AND version_number = ?
        "#,
    )
    .bind(description)
    .bind(now)
    .bind(model_id)
    .bind(version_number)
    .execute(pool)
    .await?;
    Ok(())
}
