//! Versioned, group-owned resources
//!
//! A `resources` row holds what never changes (id, type, owning group,
//! creator, parent); every modification appends a `resource_snapshots` row
//! carrying the name and the type's mutable fields as JSON, and moves
//! `latest_snapshot_id` forward.

use chrono::{DateTime, Utc};
use dioptra_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};

/// Kinds of resource stored in the `resources` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Queue,
    Experiment,
    Model,
    Artifact,
    Plugin,
    PluginFile,
    PluginParameterType,
    Job,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        ResourceType::Queue,
        ResourceType::Experiment,
        ResourceType::Model,
        ResourceType::Artifact,
        ResourceType::Plugin,
        ResourceType::PluginFile,
        ResourceType::PluginParameterType,
        ResourceType::Job,
    ];

    /// Value of the `resource_type` column
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Queue => "queue",
            ResourceType::Experiment => "experiment",
            ResourceType::Model => "model",
            ResourceType::Artifact => "artifact",
            ResourceType::Plugin => "plugin",
            ResourceType::PluginFile => "plugin_file",
            ResourceType::PluginParameterType => "plugin_task_parameter_type",
            ResourceType::Job => "job",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == value)
    }

    /// Human readable name used in messages
    pub fn label(self) -> &'static str {
        match self {
            ResourceType::Queue => "Queue",
            ResourceType::Experiment => "Experiment",
            ResourceType::Model => "Model",
            ResourceType::Artifact => "Artifact",
            ResourceType::Plugin => "Plugin",
            ResourceType::PluginFile => "Plugin file",
            ResourceType::PluginParameterType => "Plugin parameter type",
            ResourceType::Job => "Job",
        }
    }

    /// Whether past revisions are exposed through the API
    pub fn has_snapshots(self) -> bool {
        !matches!(self, ResourceType::Model | ResourceType::Job)
    }
}

/// One snapshot of a resource with its ownership columns
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResourceRow {
    pub resource_id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub parent_id: Option<i64>,
    pub creator_id: i64,
    pub creator_username: String,
    pub created_on: DateTime<Utc>,
    pub snapshot_id: i64,
    pub last_modified_on: DateTime<Utc>,
    pub latest_snapshot: bool,
    pub name: Option<String>,
    pub data: String,
}

impl ResourceRow {
    /// Decode the snapshot's stored fields
    pub fn fields<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| {
            Error::Internal(format!(
                "Corrupt snapshot {} of resource {}: {}",
                self.snapshot_id, self.resource_id, e
            ))
        })
    }
}

/// Identity of a resource regardless of deletion, for references
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResourceIdentity {
    pub resource_id: i64,
    pub resource_type: String,
    pub group_id: i64,
    pub group_name: String,
    pub parent_id: Option<i64>,
    pub name: Option<String>,
}

/// Values for a new resource
#[derive(Debug, Clone)]
pub struct NewResource<'a> {
    pub resource_type: ResourceType,
    pub group_id: i64,
    pub parent_id: Option<i64>,
    pub creator_id: i64,
    pub name: Option<&'a str>,
    pub data: &'a Value,
}

/// Filters for listing the latest snapshots of one type
#[derive(Debug, Clone, Default)]
pub struct ListFilter<'a> {
    /// Only groups where this user has read access
    pub reader_id: i64,
    pub group_id: Option<i64>,
    pub parent_id: Option<i64>,
    /// Case-insensitive substring of the name
    pub search: Option<&'a str>,
}

const ROW_COLUMNS: &str = r#"
    SELECT r.resource_id, r.group_id, g.name AS group_name, r.parent_id,
           r.creator_id, u.username AS creator_username, r.created_on,
           s.snapshot_id, s.created_on AS last_modified_on,
           s.snapshot_id = r.latest_snapshot_id AS latest_snapshot,
           s.name, s.data
"#;

const ROW_SOURCE: &str = r#"
    FROM resources r
    JOIN resource_snapshots s ON s.resource_id = r.resource_id
    JOIN groups g ON g.group_id = r.group_id
    JOIN users u ON u.user_id = r.creator_id
"#;

const LIVE: &str = "r.is_deleted = 0 AND g.is_deleted = 0";

/// Latest snapshot of a live resource
pub async fn get(pool: &SqlitePool, ty: ResourceType, id: i64) -> Result<Option<ResourceRow>> {
    let sql = format!(
        "{} {} WHERE r.resource_type = ? AND r.resource_id = ? AND {} \
         AND s.snapshot_id = r.latest_snapshot_id",
        ROW_COLUMNS, ROW_SOURCE, LIVE
    );
    let row = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// A specific snapshot of a live resource
pub async fn get_snapshot(
    pool: &SqlitePool,
    ty: ResourceType,
    id: i64,
    snapshot_id: i64,
) -> Result<Option<ResourceRow>> {
    let sql = format!(
        "{} {} WHERE r.resource_type = ? AND r.resource_id = ? AND {} AND s.snapshot_id = ?",
        ROW_COLUMNS, ROW_SOURCE, LIVE
    );
    let row = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(id)
        .bind(snapshot_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Page of latest snapshots visible to a reader
pub async fn list(
    pool: &SqlitePool,
    ty: ResourceType,
    filter: &ListFilter<'_>,
    offset: i64,
    limit: i64,
) -> Result<(Vec<ResourceRow>, i64)> {
    let conditions = format!(
        r#"
        WHERE r.resource_type = ? AND {}
          AND s.snapshot_id = r.latest_snapshot_id
          AND r.group_id IN (SELECT group_id FROM group_members WHERE user_id = ? AND read = 1)
          AND (? IS NULL OR r.group_id = ?)
          AND (? IS NULL OR r.parent_id = ?)
          AND (? IS NULL OR instr(lower(COALESCE(s.name, '')), lower(?)) > 0)
        "#,
        LIVE
    );

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {} {}", ROW_SOURCE, conditions))
        .bind(ty.as_str())
        .bind(filter.reader_id)
        .bind(filter.group_id)
        .bind(filter.group_id)
        .bind(filter.parent_id)
        .bind(filter.parent_id)
        .bind(filter.search)
        .bind(filter.search)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "{} {} {} ORDER BY r.resource_id LIMIT ? OFFSET ?",
        ROW_COLUMNS, ROW_SOURCE, conditions
    );
    let rows = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(filter.reader_id)
        .bind(filter.group_id)
        .bind(filter.group_id)
        .bind(filter.parent_id)
        .bind(filter.parent_id)
        .bind(filter.search)
        .bind(filter.search)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

/// Page of every snapshot of a resource, oldest first
pub async fn list_snapshots(
    pool: &SqlitePool,
    ty: ResourceType,
    id: i64,
    offset: i64,
    limit: i64,
) -> Result<(Vec<ResourceRow>, i64)> {
    let conditions = format!("WHERE r.resource_type = ? AND r.resource_id = ? AND {}", LIVE);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {} {}", ROW_SOURCE, conditions))
        .bind(ty.as_str())
        .bind(id)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "{} {} {} ORDER BY s.snapshot_id LIMIT ? OFFSET ?",
        ROW_COLUMNS, ROW_SOURCE, conditions
    );
    let rows = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

/// Latest snapshots of the live children of a resource
pub async fn children(
    pool: &SqlitePool,
    ty: ResourceType,
    parent_id: i64,
) -> Result<Vec<ResourceRow>> {
    let sql = format!(
        "{} {} WHERE r.resource_type = ? AND r.parent_id = ? AND {} \
         AND s.snapshot_id = r.latest_snapshot_id ORDER BY r.resource_id",
        ROW_COLUMNS, ROW_SOURCE, LIVE
    );
    let rows = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Latest snapshots of every live resource of a type in a group
///
/// Resources whose parent has been deleted are left out.
pub async fn in_group(pool: &SqlitePool, ty: ResourceType, group_id: i64) -> Result<Vec<ResourceRow>> {
    let sql = format!(
        r#"
        {} {}
        WHERE r.resource_type = ? AND r.group_id = ? AND {}
          AND s.snapshot_id = r.latest_snapshot_id
          AND (r.parent_id IS NULL OR EXISTS (
              SELECT 1 FROM resources p WHERE p.resource_id = r.parent_id AND p.is_deleted = 0
          ))
        ORDER BY r.resource_id
        "#,
        ROW_COLUMNS, ROW_SOURCE, LIVE
    );
    let rows = sqlx::query_as::<_, ResourceRow>(&sql)
        .bind(ty.as_str())
        .bind(group_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Identity and current name of a resource, deleted or not
pub async fn identity(pool: &SqlitePool, id: i64) -> Result<Option<ResourceIdentity>> {
    let identity = sqlx::query_as::<_, ResourceIdentity>(
        r#"
        SELECT r.resource_id, r.resource_type, r.group_id, g.name AS group_name,
               r.parent_id, s.name
        FROM resources r
        JOIN groups g ON g.group_id = r.group_id
        LEFT JOIN resource_snapshots s ON s.snapshot_id = r.latest_snapshot_id
        WHERE r.resource_id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(identity)
}

/// Create a resource with its first snapshot
///
/// When the resource has a name it must be unique among live resources of
/// the same type, group and parent.
pub async fn create(pool: &SqlitePool, new: NewResource<'_>, now: DateTime<Utc>) -> Result<i64> {
    let data = encode(new.data)?;
    let mut tx = pool.begin().await?;

    if let Some(name) = new.name {
        ensure_name_free(
            &mut *tx,
            new.resource_type,
            new.group_id,
            new.parent_id,
            name,
            None,
        )
        .await?;
    }

    let resource_id = sqlx::query(
        r#"
        INSERT INTO resources (
            resource_type, group_id, parent_id, creator_id, created_on, is_deleted
        ) VALUES (?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(new.resource_type.as_str())
    .bind(new.group_id)
    .bind(new.parent_id)
    .bind(new.creator_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    append_snapshot(&mut *tx, resource_id, new.creator_id, new.name, &data, now).await?;

    tx.commit().await?;
    Ok(resource_id)
}

/// Append a snapshot holding new field values
pub async fn modify(
    pool: &SqlitePool,
    ty: ResourceType,
    id: i64,
    creator_id: i64,
    name: Option<&str>,
    data: &Value,
    now: DateTime<Utc>,
) -> Result<i64> {
    let data = encode(data)?;
    let mut tx = pool.begin().await?;

    let owner: Option<(i64, Option<i64>)> = sqlx::query_as(
        "SELECT group_id, parent_id FROM resources WHERE resource_id = ? AND resource_type = ? AND is_deleted = 0",
    )
    .bind(id)
    .bind(ty.as_str())
    .fetch_optional(&mut *tx)
    .await?;
    let (group_id, parent_id) =
        owner.ok_or_else(|| Error::NotFound(format!("{} {} not found", ty.label(), id)))?;

    if let Some(name) = name {
        ensure_name_free(&mut *tx, ty, group_id, parent_id, name, Some(id)).await?;
    }

    let snapshot_id = append_snapshot(&mut *tx, id, creator_id, name, &data, now).await?;

    tx.commit().await?;
    Ok(snapshot_id)
}

/// Mark a live resource deleted; false when there was nothing to delete
pub async fn soft_delete(pool: &SqlitePool, ty: ResourceType, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE resources SET is_deleted = 1 WHERE resource_id = ? AND resource_type = ? AND is_deleted = 0",
    )
    .bind(id)
    .bind(ty.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn append_snapshot(
    conn: &mut SqliteConnection,
    resource_id: i64,
    creator_id: i64,
    name: Option<&str>,
    data: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let snapshot_id = sqlx::query(
        r#"
        INSERT INTO resource_snapshots (resource_id, creator_id, created_on, name, data)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(resource_id)
    .bind(creator_id)
    .bind(now)
    .bind(name)
    .bind(data)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE resources SET latest_snapshot_id = ? WHERE resource_id = ?")
        .bind(snapshot_id)
        .bind(resource_id)
        .execute(&mut *conn)
        .await?;

    Ok(snapshot_id)
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    ty: ResourceType,
    group_id: i64,
    parent_id: Option<i64>,
    name: &str,
    exclude: Option<i64>,
) -> Result<()> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM resources r
        JOIN resource_snapshots s ON s.snapshot_id = r.latest_snapshot_id
        WHERE r.resource_type = ? AND r.group_id = ? AND r.parent_id IS ?
          AND r.is_deleted = 0 AND s.name = ? AND r.resource_id != ?
        "#,
    )
    .bind(ty.as_str())
    .bind(group_id)
    .bind(parent_id)
    .bind(name)
    .bind(exclude.unwrap_or(0))
    .fetch_one(conn)
    .await?;

    if count > 0 {
        return Err(Error::Conflict(format!(
            "{} named {} already exists",
            ty.label(),
            name
        )));
    }
    Ok(())
}

fn encode(data: &Value) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| Error::Internal(format!("Failed to encode resource fields: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_parse_back() {
        for ty in ResourceType::ALL {
            assert_eq!(ResourceType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ResourceType::parse("entry_point"), None);
    }

    #[test]
    fn test_snapshot_types() {
        assert!(ResourceType::Queue.has_snapshots());
        assert!(ResourceType::PluginFile.has_snapshots());
        assert!(!ResourceType::Model.has_snapshots());
        assert!(!ResourceType::Job.has_snapshots());
    }
}
