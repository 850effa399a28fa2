//! Queue locks
//!
//! A locked queue refuses new jobs.

use chrono::{DateTime, Utc};
use dioptra_common::Result;
use sqlx::SqlitePool;

pub async fn is_locked(pool: &SqlitePool, queue_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_locks WHERE queue_id = ?")
        .bind(queue_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Lock a queue; locking twice is a no-op
pub async fn lock(pool: &SqlitePool, queue_id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO queue_locks (queue_id, created_on) VALUES (?, ?)")
        .bind(queue_id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn unlock(pool: &SqlitePool, queue_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM queue_locks WHERE queue_id = ?")
        .bind(queue_id)
        .execute(pool)
        .await?;
    Ok(())
}
