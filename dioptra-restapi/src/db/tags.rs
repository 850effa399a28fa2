//! Tags and their attachment to resources

use chrono::{DateTime, Utc};
use dioptra_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

use super::resources::ResourceIdentity;

/// Tag row joined with its group and creator
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRecord {
    pub tag_id: i64,
    pub name: String,
    pub group_id: i64,
    pub group_name: String,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
}

const TAG_SELECT: &str = r#"
    SELECT t.tag_id, t.name, t.group_id, g.name AS group_name,
           t.creator_id, u.username AS creator_username,
           t.created_on, t.last_modified_on
    FROM tags t
    JOIN groups g ON g.group_id = t.group_id
    JOIN users u ON u.user_id = t.creator_id
"#;

pub async fn get(pool: &SqlitePool, tag_id: i64) -> Result<Option<TagRecord>> {
    let sql = format!(
        "{} WHERE t.tag_id = ? AND t.is_deleted = 0 AND g.is_deleted = 0",
        TAG_SELECT
    );
    let tag = sqlx::query_as::<_, TagRecord>(&sql)
        .bind(tag_id)
        .fetch_optional(pool)
        .await?;
    Ok(tag)
}

/// Page of live tags in groups the reader can read
pub async fn list(
    pool: &SqlitePool,
    reader_id: i64,
    group_id: Option<i64>,
    search: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<TagRecord>, i64)> {
    let conditions = r#"
        WHERE t.is_deleted = 0 AND g.is_deleted = 0
          AND t.group_id IN (SELECT group_id FROM group_members WHERE user_id = ? AND read = 1)
          AND (? IS NULL OR t.group_id = ?)
          AND (? IS NULL OR instr(lower(t.name), lower(?)) > 0)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM tags t JOIN groups g ON g.group_id = t.group_id {}",
        conditions
    ))
    .bind(reader_id)
    .bind(group_id)
    .bind(group_id)
    .bind(search)
    .bind(search)
    .fetch_one(pool)
    .await?;

    let sql = format!("{} {} ORDER BY t.tag_id LIMIT ? OFFSET ?", TAG_SELECT, conditions);
    let tags = sqlx::query_as::<_, TagRecord>(&sql)
        .bind(reader_id)
        .bind(group_id)
        .bind(group_id)
        .bind(search)
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((tags, total))
}

/// Create a tag; names are unique within a group
pub async fn create(
    pool: &SqlitePool,
    group_id: i64,
    creator_id: i64,
    name: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    if name_taken(&mut *tx, group_id, name, None).await? {
        return Err(Error::Conflict(format!("Tag named {} already exists", name)));
    }

    let tag_id = sqlx::query(
        r#"
        INSERT INTO tags (group_id, creator_id, name, created_on, last_modified_on, is_deleted)
        VALUES (?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(group_id)
    .bind(creator_id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;
    Ok(tag_id)
}

pub async fn rename(pool: &SqlitePool, tag: &TagRecord, name: &str, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;

    if name_taken(&mut *tx, tag.group_id, name, Some(tag.tag_id)).await? {
        return Err(Error::Conflict(format!("Tag named {} already exists", name)));
    }
    sqlx::query("UPDATE tags SET name = ?, last_modified_on = ? WHERE tag_id = ?")
        .bind(name)
        .bind(now)
        .bind(tag.tag_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn name_taken(
    conn: &mut SqliteConnection,
    group_id: i64,
    name: &str,
    exclude: Option<i64>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tags WHERE group_id = ? AND name = ? AND is_deleted = 0 AND tag_id != ?",
    )
    .bind(group_id)
    .bind(name)
    .bind(exclude.unwrap_or(0))
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Delete a tag and detach it from every resource
pub async fn soft_delete(pool: &SqlitePool, tag_id: i64, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE tags SET is_deleted = 1, last_modified_on = ? WHERE tag_id = ?")
        .bind(now)
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM resource_tags WHERE tag_id = ?")
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Live tags attached to a resource
pub async fn for_resource(pool: &SqlitePool, resource_id: i64) -> Result<Vec<TagRecord>> {
    let sql = format!(
        r#"
        {}
        JOIN resource_tags rt ON rt.tag_id = t.tag_id
        WHERE rt.resource_id = ? AND t.is_deleted = 0
        ORDER BY t.tag_id
        "#,
        TAG_SELECT
    );
    let tags = sqlx::query_as::<_, TagRecord>(&sql)
        .bind(resource_id)
        .fetch_all(pool)
        .await?;
    Ok(tags)
}

/// Ids among `tag_ids` that are not live tags of the group
pub async fn foreign_ids(pool: &SqlitePool, tag_ids: &[i64], group_id: i64) -> Result<Vec<i64>> {
    let mut foreign = Vec::new();
    for &tag_id in tag_ids {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tags WHERE tag_id = ? AND group_id = ? AND is_deleted = 0",
        )
        .bind(tag_id)
        .bind(group_id)
        .fetch_one(pool)
        .await?;
        if count == 0 {
            foreign.push(tag_id);
        }
    }
    Ok(foreign)
}

/// Attach tags to a resource, optionally detaching all others first
pub async fn attach(pool: &SqlitePool, resource_id: i64, tag_ids: &[i64], replace: bool) -> Result<()> {
    let mut tx = pool.begin().await?;

    if replace {
        sqlx::query("DELETE FROM resource_tags WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;
    }
    for &tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO resource_tags (resource_id, tag_id) VALUES (?, ?)")
            .bind(resource_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Detach one tag; false when it was not attached
pub async fn detach(pool: &SqlitePool, resource_id: i64, tag_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM resource_tags WHERE resource_id = ? AND tag_id = ?")
        .bind(resource_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn detach_all(pool: &SqlitePool, resource_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM resource_tags WHERE resource_id = ?")
        .bind(resource_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Live resources carrying the tag
pub async fn tagged_resources(pool: &SqlitePool, tag_id: i64) -> Result<Vec<ResourceIdentity>> {
    let resources = sqlx::query_as::<_, ResourceIdentity>(
        r#"
        SELECT r.resource_id, r.resource_type, r.group_id, g.name AS group_name,
               r.parent_id, s.name
        FROM resource_tags rt
        JOIN resources r ON r.resource_id = rt.resource_id
        JOIN groups g ON g.group_id = r.group_id
        LEFT JOIN resource_snapshots s ON s.snapshot_id = r.latest_snapshot_id
        WHERE rt.tag_id = ? AND r.is_deleted = 0
        ORDER BY r.resource_id
        "#,
    )
    .bind(tag_id)
    .fetch_all(pool)
    .await?;
    Ok(resources)
}
