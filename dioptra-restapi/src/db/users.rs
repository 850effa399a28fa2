//! User accounts, locks and revoked session tokens

use chrono::{DateTime, Utc};
use dioptra_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::groups::{self, MemberPermissions};

/// Name given to the group the first user creates
pub const PUBLIC_GROUP_NAME: &str = "public";

/// Settings key holding the id of the group new users join
pub const DEFAULT_GROUP_SETTING: &str = "default_group_id";

/// Lock added when a user deletes their account
pub const DELETE_LOCK: &str = "delete";

/// User row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub alternative_id: String,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
    pub last_login_on: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

const USER_COLUMNS: &str = "user_id, username, email, password_hash, alternative_id, \
     created_on, last_modified_on, last_login_on, is_deleted";

/// Load a live user by id
pub async fn get_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<UserRecord>> {
    let sql = format!(
        "SELECT {} FROM users WHERE user_id = ? AND is_deleted = 0",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Load a live user by username
pub async fn get_by_username(pool: &SqlitePool, username: &str) -> Result<Option<UserRecord>> {
    let sql = format!(
        "SELECT {} FROM users WHERE username = ? AND is_deleted = 0",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Whether a live user other than `exclude` holds the username
pub async fn username_taken(
    pool: &SqlitePool,
    username: &str,
    exclude: Option<i64>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE username = ? AND is_deleted = 0 AND user_id != ?",
    )
    .bind(username)
    .bind(exclude.unwrap_or(0))
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Page of live users, optionally filtered by a username substring
pub async fn list(
    pool: &SqlitePool,
    search: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<UserRecord>, i64)> {
    let filter = "is_deleted = 0 AND (? IS NULL OR instr(lower(username), lower(?)) > 0)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {}", filter))
        .bind(search)
        .bind(search)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY user_id LIMIT ? OFFSET ?",
        USER_COLUMNS, filter
    );
    let users = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(search)
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((users, total))
}

/// Create a user and enrol them in the default group
///
/// The first user to register creates the `public` group, becomes its owner
/// and the group's id is recorded as the default. Everyone after joins that
/// group with read and write access, whatever it has since been renamed to.
/// Once the default group is deleted new users join no group.
pub async fn register(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let taken: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? AND is_deleted = 0")
            .bind(username)
            .fetch_one(&mut *tx)
            .await?;
    if taken > 0 {
        return Err(Error::Conflict(format!("Username {} is taken", username)));
    }

    let user_id = sqlx::query(
        r#"
        INSERT INTO users (
            username, email, password_hash, alternative_id,
            created_on, last_modified_on, is_deleted
        ) VALUES (?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(Uuid::new_v4().to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    join_default_group(&mut *tx, user_id, now).await?;

    tx.commit().await?;
    Ok(user_id)
}

async fn join_default_group(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let stored: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(DEFAULT_GROUP_SETTING)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(stored) = stored else {
        let group_id = groups::insert_group(&mut *conn, PUBLIC_GROUP_NAME, user_id, now).await?;
        sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
            .bind(DEFAULT_GROUP_SETTING)
            .bind(group_id.to_string())
            .execute(&mut *conn)
            .await?;
        return Ok(());
    };

    let group_id: i64 = stored.parse().map_err(|_| {
        Error::Internal(format!("Corrupt {} setting: {}", DEFAULT_GROUP_SETTING, stored))
    })?;
    let live: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM groups WHERE group_id = ? AND is_deleted = 0")
            .bind(group_id)
            .fetch_one(&mut *conn)
            .await?;
    if live == 0 {
        return Ok(());
    }

    let permissions = MemberPermissions {
        read: true,
        write: true,
        share_read: false,
        share_write: false,
    };
    groups::insert_member(conn, group_id, user_id, permissions).await
}

/// Change username and email
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    username: &str,
    email: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET username = ?, email = ?, last_modified_on = ? WHERE user_id = ?",
    )
    .bind(username)
    .bind(email)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store a new password hash and invalidate existing sessions
pub async fn set_password(
    pool: &SqlitePool,
    user_id: i64,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, alternative_id = ?, last_modified_on = ?
        WHERE user_id = ?
        "#,
    )
    .bind(password_hash)
    .bind(Uuid::new_v4().to_string())
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the alternative id, invalidating every issued session
pub async fn rotate_alternative_id(pool: &SqlitePool, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET alternative_id = ? WHERE user_id = ?")
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_login(pool: &SqlitePool, user_id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login_on = ? WHERE user_id = ?")
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Soft-delete a user and lock the account
pub async fn soft_delete(pool: &SqlitePool, user_id: i64, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET is_deleted = 1, alternative_id = ?, last_modified_on = ?
        WHERE user_id = ?
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(now)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO user_locks (user_id, user_lock_type, created_on) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(DELETE_LOCK)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Whether any lock is held on the account
pub async fn is_locked(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_locks WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Record a token as revoked until its expiry
pub async fn revoke_token(pool: &SqlitePool, jti: &str, user_id: i64, expires_on: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_on) VALUES (?, ?, ?)")
        .bind(jti)
        .bind(user_id)
        .bind(expires_on)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn is_token_revoked(pool: &SqlitePool, jti: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?")
        .bind(jti)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Drop revocation entries whose tokens have expired anyway
pub async fn purge_expired_revocations(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_on < ?")
        .bind(now.timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
