//! Handlers shared by every group-owned resource type
//!
//! Each resource type implements [`ResourceKind`], naming its
//! [`ResourceType`] and the mutable fields stored in each snapshot. The
//! generic handlers below cover get, list, delete, snapshot history and
//! tagging; types with extra response fields add their own get and list.
//!
//! Access rules: reading needs `read` membership in the owning group;
//! creating, modifying, deleting and tagging need `write`.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use dioptra_common::time;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::views::{
    collection_url, resource_url, DeleteResponse, GroupRef, IdsRequest, ResourceView, TagRef,
    UserRef,
};
use crate::db::groups;
use crate::db::resources::{self, ListFilter, NewResource, ResourceRow, ResourceType};
use crate::db::tags;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery, Paging};
use crate::AppState;

/// Longest accepted resource name
pub const MAX_NAME_LENGTH: usize = 255;

/// A resource type served by the generic handlers
pub trait ResourceKind: Send + Sync + 'static {
    const TYPE: ResourceType;

    /// Mutable fields stored in each snapshot
    type Fields: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Fields of resources that are just a name and a description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFields {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NamedFields {
    /// Trim and check the name
    pub fn validated(self) -> ApiResult<Self> {
        Ok(Self {
            name: validate_name(&self.name)?,
            description: self.description,
        })
    }
}

/// Creation request: the owning group plus the type's fields
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest<F> {
    pub group: i64,
    #[serde(flatten)]
    pub fields: F,
}

/// Trimmed name, rejecting empty and overlong values
pub fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

pub fn not_found(ty: ResourceType, id: i64) -> ApiError {
    ApiError::NotFound(format!("{} {} not found", ty.label(), id))
}

pub async fn require_read(state: &AppState, user: &CurrentUser, group_id: i64) -> ApiResult<()> {
    match groups::permissions(&state.db, group_id, user.id()).await? {
        Some(permissions) if permissions.read => Ok(()),
        _ => Err(ApiError::Forbidden(format!(
            "Read access to group {} denied",
            group_id
        ))),
    }
}

pub async fn require_write(state: &AppState, user: &CurrentUser, group_id: i64) -> ApiResult<()> {
    match groups::permissions(&state.db, group_id, user.id()).await? {
        Some(permissions) if permissions.write => Ok(()),
        _ => Err(ApiError::Forbidden(format!(
            "Write access to group {} denied",
            group_id
        ))),
    }
}

/// Latest snapshot of a resource the user may read
pub async fn load_readable(
    state: &AppState,
    user: &CurrentUser,
    ty: ResourceType,
    id: i64,
) -> ApiResult<ResourceRow> {
    let row = resources::get(&state.db, ty, id)
        .await?
        .ok_or_else(|| not_found(ty, id))?;
    require_read(state, user, row.group_id).await?;
    Ok(row)
}

/// Latest snapshot of a resource the user may modify
pub async fn load_writable(
    state: &AppState,
    user: &CurrentUser,
    ty: ResourceType,
    id: i64,
) -> ApiResult<ResourceRow> {
    let row = resources::get(&state.db, ty, id)
        .await?
        .ok_or_else(|| not_found(ty, id))?;
    require_write(state, user, row.group_id).await?;
    Ok(row)
}

/// Wrap a body with the row's ownership, timing and tags
pub async fn view_with<B>(
    state: &AppState,
    ty: ResourceType,
    row: &ResourceRow,
    body: B,
) -> ApiResult<ResourceView<B>> {
    let tags = tags::for_resource(&state.db, row.resource_id).await?;

    Ok(ResourceView {
        id: row.resource_id,
        snapshot: ty.has_snapshots().then_some(row.snapshot_id),
        group: GroupRef::new(row.group_id, row.group_name.clone()),
        user: UserRef::new(row.creator_id, row.creator_username.clone()),
        created_on: row.created_on,
        last_modified_on: row.last_modified_on,
        latest_snapshot: row.latest_snapshot,
        tags: tags.iter().map(TagRef::from).collect(),
        body,
    })
}

/// View whose body is the stored fields as-is
pub async fn view_of<K: ResourceKind>(
    state: &AppState,
    row: &ResourceRow,
) -> ApiResult<ResourceView<K::Fields>> {
    let fields = row.fields::<K::Fields>()?;
    view_with(state, K::TYPE, row, fields).await
}

/// One page of latest snapshots visible to the user
pub async fn fetch_page(
    state: &AppState,
    user: &CurrentUser,
    ty: ResourceType,
    query: &PageQuery,
    parent_id: Option<i64>,
) -> ApiResult<(Vec<ResourceRow>, i64, Paging)> {
    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let filter = ListFilter {
        reader_id: user.id(),
        group_id: query.group_id,
        parent_id,
        search: query.search_term(),
    };
    let (rows, total) =
        resources::list(&state.db, ty, &filter, paging.index, paging.page_length).await?;
    Ok((rows, total, paging))
}

/// Create a resource in a group the user can write to
pub async fn insert_resource<F: Serialize>(
    state: &AppState,
    user: &CurrentUser,
    ty: ResourceType,
    group_id: i64,
    parent_id: Option<i64>,
    name: Option<&str>,
    fields: &F,
) -> ApiResult<ResourceRow> {
    if groups::get(&state.db, group_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Group {} not found", group_id)));
    }
    require_write(state, user, group_id).await?;

    let data = serde_json::to_value(fields)
        .map_err(|e| ApiError::Internal(format!("Failed to encode fields: {}", e)))?;
    let new = NewResource {
        resource_type: ty,
        group_id,
        parent_id,
        creator_id: user.id(),
        name,
        data: &data,
    };
    let id = resources::create(&state.db, new, time::now()).await?;
    info!(resource = ty.as_str(), id, group_id, "Resource created");

    resources::get(&state.db, ty, id)
        .await?
        .ok_or_else(|| not_found(ty, id))
}

/// Append a snapshot to a resource already checked for write access
pub async fn update_resource<F: Serialize>(
    state: &AppState,
    user: &CurrentUser,
    ty: ResourceType,
    row: &ResourceRow,
    name: Option<&str>,
    fields: &F,
) -> ApiResult<ResourceRow> {
    let data = serde_json::to_value(fields)
        .map_err(|e| ApiError::Internal(format!("Failed to encode fields: {}", e)))?;
    let snapshot_id = resources::modify(
        &state.db,
        ty,
        row.resource_id,
        user.id(),
        name,
        &data,
        time::now(),
    )
    .await?;
    info!(resource = ty.as_str(), id = row.resource_id, snapshot_id, "Resource modified");

    resources::get(&state.db, ty, row.resource_id)
        .await?
        .ok_or_else(|| not_found(ty, row.resource_id))
}

/// GET /<type>/:id
pub async fn get_resource<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResourceView<K::Fields>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "GET", id, "Request received");

    let row = load_readable(&state, &user, K::TYPE, id).await?;
    Ok(Json(view_of::<K>(&state, &row).await?))
}

/// GET /<type>
pub async fn list_resources<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<K::Fields>>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "GET", "Request received");

    let (rows, total, paging) = fetch_page(&state, &user, K::TYPE, &query, None).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(view_of::<K>(&state, row).await?);
    }

    Ok(Json(Page::new(
        &collection_url(K::TYPE),
        &query,
        paging,
        views,
        total,
    )))
}

/// DELETE /<type>/:id
pub async fn delete_resource<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = K::TYPE.as_str(), request_type = "DELETE", id, "Request received");

    load_writable(&state, &user, K::TYPE, id).await?;
    if !resources::soft_delete(&state.db, K::TYPE, id).await? {
        return Err(not_found(K::TYPE, id));
    }
    info!(resource = K::TYPE.as_str(), id, "Resource deleted");

    Ok(Json(DeleteResponse::new(id)))
}

/// POST /<type> for name-and-description types
pub async fn create_named<K: ResourceKind<Fields = NamedFields>>(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<NamedFields>>,
) -> ApiResult<Json<ResourceView<NamedFields>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "POST", "Request received");

    let fields = request.fields.validated()?;
    let row = insert_resource(
        &state,
        &user,
        K::TYPE,
        request.group,
        None,
        Some(&fields.name),
        &fields,
    )
    .await?;
    Ok(Json(view_of::<K>(&state, &row).await?))
}

/// PUT /<type>/:id for name-and-description types
pub async fn modify_named<K: ResourceKind<Fields = NamedFields>>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(fields): Json<NamedFields>,
) -> ApiResult<Json<ResourceView<NamedFields>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "PUT", id, "Request received");

    let fields = fields.validated()?;
    let row = load_writable(&state, &user, K::TYPE, id).await?;
    let row = update_resource(&state, &user, K::TYPE, &row, Some(&fields.name), &fields).await?;
    Ok(Json(view_of::<K>(&state, &row).await?))
}

/// GET /<type>/:id/snapshots
pub async fn list_snapshots<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<K::Fields>>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "GET", id, "Snapshots request received");

    let row = load_readable(&state, &user, K::TYPE, id).await?;
    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (rows, total) =
        resources::list_snapshots(&state.db, K::TYPE, id, paging.index, paging.page_length)
            .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(view_of::<K>(&state, row).await?);
    }

    let route = format!("{}/snapshots", resource_url(K::TYPE, id, row.parent_id));
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

/// GET /<type>/:id/snapshots/:snapshot_id
pub async fn get_snapshot<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, snapshot_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ResourceView<K::Fields>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "GET", id, snapshot_id, "Snapshot request received");

    load_readable(&state, &user, K::TYPE, id).await?;
    let row = resources::get_snapshot(&state.db, K::TYPE, id, snapshot_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Snapshot {} of {} {} not found",
                snapshot_id,
                K::TYPE.label(),
                id
            ))
        })?;
    Ok(Json(view_of::<K>(&state, &row).await?))
}

async fn current_tags(state: &AppState, resource_id: i64) -> ApiResult<Vec<TagRef>> {
    let tags = tags::for_resource(&state.db, resource_id).await?;
    Ok(tags.iter().map(TagRef::from).collect())
}

async fn attach_tags(
    state: &AppState,
    row: &ResourceRow,
    tag_ids: &[i64],
    replace: bool,
) -> ApiResult<Vec<TagRef>> {
    let foreign = tags::foreign_ids(&state.db, tag_ids, row.group_id).await?;
    if !foreign.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Tags {:?} do not exist in group {}",
            foreign, row.group_id
        )));
    }
    tags::attach(&state.db, row.resource_id, tag_ids, replace).await?;
    current_tags(state, row.resource_id).await
}

/// GET /<type>/:id/tags
pub async fn get_tags<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<TagRef>>> {
    load_readable(&state, &user, K::TYPE, id).await?;
    Ok(Json(current_tags(&state, id).await?))
}

/// PUT /<type>/:id/tags replaces the attached tags
pub async fn replace_tags<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<Vec<TagRef>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "PUT", id, "Tags request received");

    let row = load_writable(&state, &user, K::TYPE, id).await?;
    Ok(Json(attach_tags(&state, &row, &request.ids, true).await?))
}

/// POST /<type>/:id/tags appends tags
pub async fn append_tags<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<Vec<TagRef>>> {
    debug!(resource = K::TYPE.as_str(), request_type = "POST", id, "Tags request received");

    let row = load_writable(&state, &user, K::TYPE, id).await?;
    Ok(Json(attach_tags(&state, &row, &request.ids, false).await?))
}

/// DELETE /<type>/:id/tags removes every tag
pub async fn remove_all_tags<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    load_writable(&state, &user, K::TYPE, id).await?;
    tags::detach_all(&state.db, id).await?;
    Ok(Json(DeleteResponse::new(id)))
}

/// DELETE /<type>/:id/tags/:tag_id
pub async fn remove_tag<K: ResourceKind>(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, tag_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DeleteResponse>> {
    load_writable(&state, &user, K::TYPE, id).await?;
    if !tags::detach(&state.db, id, tag_id).await? {
        return Err(ApiError::NotFound(format!(
            "Tag {} is not attached to {} {}",
            tag_id,
            K::TYPE.label(),
            id
        )));
    }
    Ok(Json(DeleteResponse::new(tag_id)))
}

/// Snapshot history routes under `prefix`
pub fn snapshot_routes<K: ResourceKind>(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{}/:id/snapshots", prefix), get(list_snapshots::<K>))
        .route(
            &format!("{}/:id/snapshots/:snapshot_id", prefix),
            get(get_snapshot::<K>),
        )
}

/// Tagging routes under `prefix`
pub fn tag_routes<K: ResourceKind>(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("{}/:id/tags", prefix),
            get(get_tags::<K>)
                .put(replace_tags::<K>)
                .post(append_tags::<K>)
                .delete(remove_all_tags::<K>),
        )
        .route(
            &format!("{}/:id/tags/:tag_id", prefix),
            axum::routing::delete(remove_tag::<K>),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  queue one ").unwrap(), "queue one");
    }

    #[test]
    fn test_validate_name_rejects_blank_and_long() {
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_create_request_flattens_fields() {
        let request: CreateRequest<NamedFields> =
            serde_json::from_str(r#"{"group": 1, "name": "q", "description": "d"}"#).unwrap();
        assert_eq!(request.group, 1);
        assert_eq!(request.fields.name, "q");

        let request: CreateRequest<NamedFields> =
            serde_json::from_str(r#"{"group": 2, "name": "q"}"#).unwrap();
        assert_eq!(request.fields.description, "");
    }
}
