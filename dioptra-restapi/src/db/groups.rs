//! Groups, memberships and manager roles

use chrono::{DateTime, Utc};
use dioptra_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

/// Group row joined with its creator's username
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupRecord {
    pub group_id: i64,
    pub name: String,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
}

/// Access flags of a group member
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct MemberPermissions {
    pub read: bool,
    pub write: bool,
    pub share_read: bool,
    pub share_write: bool,
}

impl MemberPermissions {
    pub const FULL: MemberPermissions = MemberPermissions {
        read: true,
        write: true,
        share_read: true,
        share_write: true,
    };
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRecord {
    pub user_id: i64,
    pub username: String,
    #[sqlx(flatten)]
    pub permissions: MemberPermissions,
}

/// Manager role flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ManagerRole {
    pub owner: bool,
    pub admin: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ManagerRecord {
    pub user_id: i64,
    pub username: String,
    #[sqlx(flatten)]
    pub role: ManagerRole,
}

const GROUP_SELECT: &str = r#"
    SELECT g.group_id, g.name, g.creator_id, u.username AS creator_username,
           g.created_on, g.last_modified_on
    FROM groups g
    JOIN users u ON u.user_id = g.creator_id
"#;

/// Load a live group
pub async fn get(pool: &SqlitePool, group_id: i64) -> Result<Option<GroupRecord>> {
    let sql = format!("{} WHERE g.group_id = ? AND g.is_deleted = 0", GROUP_SELECT);
    let group = sqlx::query_as::<_, GroupRecord>(&sql)
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
    Ok(group)
}

/// Page of live groups the user is a member of
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    search: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<GroupRecord>, i64)> {
    let filter = r#"
        g.is_deleted = 0
        AND g.group_id IN (SELECT group_id FROM group_members WHERE user_id = ?)
        AND (? IS NULL OR instr(lower(g.name), lower(?)) > 0)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM groups g WHERE {}", filter))
        .bind(user_id)
        .bind(search)
        .bind(search)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "{} WHERE {} ORDER BY g.group_id LIMIT ? OFFSET ?",
        GROUP_SELECT, filter
    );
    let groups = sqlx::query_as::<_, GroupRecord>(&sql)
        .bind(user_id)
        .bind(search)
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((groups, total))
}

/// Live groups a user belongs to, as `(id, name)`
pub async fn memberships_of(pool: &SqlitePool, user_id: i64) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query_as::<_, (i64, String)>(
        r#"
        SELECT g.group_id, g.name
        FROM groups g
        JOIN group_members m ON m.group_id = g.group_id
        WHERE m.user_id = ? AND g.is_deleted = 0
        ORDER BY g.group_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Create a group whose creator is its owner with full access
pub async fn create(
    pool: &SqlitePool,
    name: &str,
    creator_id: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    if name_taken(&mut *tx, name, None).await? {
        return Err(Error::Conflict(format!("Group name {} is taken", name)));
    }
    let group_id = insert_group(&mut *tx, name, creator_id, now).await?;

    tx.commit().await?;
    Ok(group_id)
}

/// Insert a group row plus the creator's membership and ownership
pub(crate) async fn insert_group(
    conn: &mut SqliteConnection,
    name: &str,
    creator_id: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let group_id = sqlx::query(
        r#"
        INSERT INTO groups (name, creator_id, created_on, last_modified_on, is_deleted)
        VALUES (?, ?, ?, ?, 0)
        "#,
    )
    .bind(name)
    .bind(creator_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    insert_member(conn, group_id, creator_id, MemberPermissions::FULL).await?;
    insert_manager(
        conn,
        group_id,
        creator_id,
        ManagerRole {
            owner: true,
            admin: true,
        },
    )
    .await?;

    Ok(group_id)
}

async fn name_taken(conn: &mut SqliteConnection, name: &str, exclude: Option<i64>) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM groups WHERE name = ? AND is_deleted = 0 AND group_id != ?",
    )
    .bind(name)
    .bind(exclude.unwrap_or(0))
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn rename(pool: &SqlitePool, group_id: i64, name: &str, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;

    if name_taken(&mut *tx, name, Some(group_id)).await? {
        return Err(Error::Conflict(format!("Group name {} is taken", name)));
    }
    sqlx::query("UPDATE groups SET name = ?, last_modified_on = ? WHERE group_id = ?")
        .bind(name)
        .bind(now)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn soft_delete(pool: &SqlitePool, group_id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE groups SET is_deleted = 1, last_modified_on = ? WHERE group_id = ?")
        .bind(now)
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn members(pool: &SqlitePool, group_id: i64) -> Result<Vec<MemberRecord>> {
    let members = sqlx::query_as::<_, MemberRecord>(
        r#"
        SELECT m.user_id, u.username, m.read, m.write, m.share_read, m.share_write
        FROM group_members m
        JOIN users u ON u.user_id = m.user_id
        WHERE m.group_id = ?
        ORDER BY m.user_id
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

pub async fn member(pool: &SqlitePool, group_id: i64, user_id: i64) -> Result<Option<MemberRecord>> {
    let member = sqlx::query_as::<_, MemberRecord>(
        r#"
        SELECT m.user_id, u.username, m.read, m.write, m.share_read, m.share_write
        FROM group_members m
        JOIN users u ON u.user_id = m.user_id
        WHERE m.group_id = ? AND m.user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(member)
}

/// Permissions a user holds in a live group
pub async fn permissions(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
) -> Result<Option<MemberPermissions>> {
    let permissions = sqlx::query_as::<_, MemberPermissions>(
        r#"
        SELECT m.read, m.write, m.share_read, m.share_write
        FROM group_members m
        JOIN groups g ON g.group_id = m.group_id
        WHERE m.group_id = ? AND m.user_id = ? AND g.is_deleted = 0
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(permissions)
}

pub async fn add_member(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
    permissions: MemberPermissions,
) -> Result<()> {
    let mut conn = pool.acquire().await?;
    insert_member(&mut *conn, group_id, user_id, permissions).await
}

pub(crate) async fn insert_member(
    conn: &mut SqliteConnection,
    group_id: i64,
    user_id: i64,
    permissions: MemberPermissions,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, read, write, share_read, share_write)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .bind(permissions.read)
    .bind(permissions.write)
    .bind(permissions.share_read)
    .bind(permissions.share_write)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_member(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
    permissions: MemberPermissions,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE group_members
        SET read = ?, write = ?, share_read = ?, share_write = ?
        WHERE group_id = ? AND user_id = ?
        "#,
    )
    .bind(permissions.read)
    .bind(permissions.write)
    .bind(permissions.share_read)
    .bind(permissions.share_write)
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_member(pool: &SqlitePool, group_id: i64, user_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn managers(pool: &SqlitePool, group_id: i64) -> Result<Vec<ManagerRecord>> {
    let managers = sqlx::query_as::<_, ManagerRecord>(
        r#"
        SELECT m.user_id, u.username, m.owner, m.admin
        FROM group_managers m
        JOIN users u ON u.user_id = m.user_id
        WHERE m.group_id = ?
        ORDER BY m.user_id
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(managers)
}

pub async fn manager(pool: &SqlitePool, group_id: i64, user_id: i64) -> Result<Option<ManagerRecord>> {
    let manager = sqlx::query_as::<_, ManagerRecord>(
        r#"
        SELECT m.user_id, u.username, m.owner, m.admin
        FROM group_managers m
        JOIN users u ON u.user_id = m.user_id
        WHERE m.group_id = ? AND m.user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(manager)
}

/// Add a manager, granting full membership when the user is not yet a member
pub async fn add_manager(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
    role: ManagerRole,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO group_members (group_id, user_id, read, write, share_read, share_write)
        VALUES (?, ?, 1, 1, 1, 1)
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    insert_manager(&mut *tx, group_id, user_id, role).await?;

    tx.commit().await?;
    Ok(())
}

async fn insert_manager(
    conn: &mut SqliteConnection,
    group_id: i64,
    user_id: i64,
    role: ManagerRole,
) -> Result<()> {
    sqlx::query("INSERT INTO group_managers (group_id, user_id, owner, admin) VALUES (?, ?, ?, ?)")
        .bind(group_id)
        .bind(user_id)
        .bind(role.owner)
        .bind(role.admin)
        .execute(conn)
        .await?;
    Ok(())
}

/// Change a manager's role unless that would leave the group without an owner
///
/// The owner count is checked inside the same statement, so concurrent
/// demotions cannot both pass. Returns false when the change was refused.
pub async fn update_manager(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
    role: ManagerRole,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE group_managers SET owner = ?, admin = ?
        WHERE group_id = ? AND user_id = ?
          AND (? OR owner = 0 OR (
              SELECT COUNT(*) FROM group_managers WHERE group_id = ? AND owner = 1
          ) > 1)
        "#,
    )
    .bind(role.owner)
    .bind(role.admin)
    .bind(group_id)
    .bind(user_id)
    .bind(role.owner)
    .bind(group_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a manager unless they are the group's last owner
///
/// Returns false when the removal was refused.
pub async fn remove_manager(pool: &SqlitePool, group_id: i64, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM group_managers
        WHERE group_id = ? AND user_id = ?
          AND (owner = 0 OR (
              SELECT COUNT(*) FROM group_managers WHERE group_id = ? AND owner = 1
          ) > 1)
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .bind(group_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_owners(pool: &SqlitePool, group_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM group_managers WHERE group_id = ? AND owner = 1")
            .bind(group_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
