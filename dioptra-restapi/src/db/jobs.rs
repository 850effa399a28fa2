//! Job status tracking

use chrono::{DateTime, Utc};
use dioptra_common::Result;
use sqlx::SqlitePool;

pub async fn status(pool: &SqlitePool, job_id: i64) -> Result<Option<String>> {
    let status = sqlx::query_scalar("SELECT status FROM job_statuses WHERE job_id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    Ok(status)
}

/// Set the status, creating the row on first use
pub async fn set_status(pool: &SqlitePool, job_id: i64, status: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_statuses (job_id, status, last_modified_on) VALUES (?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            status = excluded.status,
            last_modified_on = excluded.last_modified_on
        "#,
    )
    .bind(job_id)
    .bind(status)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
