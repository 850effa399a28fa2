//! Tags: group-scoped labels attached to resources

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use dioptra_common::time;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::{require_read, require_write, validate_name};
use super::views::{DeleteResponse, GroupRef, ResourceRef, UserRef};
use crate::db::groups;
use crate::db::tags::{self, TagRecord};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::{AppState, API_V1};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagView {
    pub id: i64,
    pub name: String,
    pub group: GroupRef,
    pub user: UserRef,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
}

impl From<TagRecord> for TagView {
    fn from(tag: TagRecord) -> Self {
        Self {
            id: tag.tag_id,
            name: tag.name,
            group: GroupRef::new(tag.group_id, tag.group_name),
            user: UserRef::new(tag.creator_id, tag.creator_username),
            created_on: tag.created_on,
            last_modified_on: tag.last_modified_on,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    pub group: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameTagRequest {
    pub name: String,
}

async fn load_tag(state: &AppState, id: i64) -> ApiResult<TagRecord> {
    tags::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tag {} not found", id)))
}

/// GET /api/v1/tags
pub async fn list_tags(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<TagView>>> {
    debug!(resource = "tag", request_type = "GET", "Request received");

    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (records, total) = tags::list(
        &state.db,
        user.id(),
        query.group_id,
        query.search_term(),
        paging.index,
        paging.page_length,
    )
    .await?;

    let views = records.into_iter().map(TagView::from).collect();
    Ok(Json(Page::new(
        &format!("{}/tags", API_V1),
        &query,
        paging,
        views,
        total,
    )))
}

/// POST /api/v1/tags
pub async fn create_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<Json<TagView>> {
    debug!(resource = "tag", request_type = "POST", group_id = request.group, "Request received");

    let name = validate_name(&request.name)?;
    if groups::get(&state.db, request.group).await?.is_none() {
        return Err(ApiError::NotFound(format!("Group {} not found", request.group)));
    }
    require_write(&state, &user, request.group).await?;

    let id = tags::create(&state.db, request.group, user.id(), &name, time::now()).await?;
    info!(resource = "tag", id, group_id = request.group, "Tag created");

    Ok(Json(load_tag(&state, id).await?.into()))
}

/// GET /api/v1/tags/:id
pub async fn get_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<TagView>> {
    let tag = load_tag(&state, id).await?;
    require_read(&state, &user, tag.group_id).await?;
    Ok(Json(tag.into()))
}

/// PUT /api/v1/tags/:id
pub async fn modify_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<RenameTagRequest>,
) -> ApiResult<Json<TagView>> {
    debug!(resource = "tag", request_type = "PUT", id, "Request received");

    let name = validate_name(&request.name)?;
    let tag = load_tag(&state, id).await?;
    require_write(&state, &user, tag.group_id).await?;

    tags::rename(&state.db, &tag, &name, time::now()).await?;
    Ok(Json(load_tag(&state, id).await?.into()))
}

/// DELETE /api/v1/tags/:id
pub async fn delete_tag(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "tag", request_type = "DELETE", id, "Request received");

    let tag = load_tag(&state, id).await?;
    require_write(&state, &user, tag.group_id).await?;

    tags::soft_delete(&state.db, id, time::now()).await?;
    info!(resource = "tag", id, "Tag deleted");
    Ok(Json(DeleteResponse::new(id)))
}

/// GET /api/v1/tags/:id/resources
pub async fn tagged_resources(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ResourceRef>>> {
    let tag = load_tag(&state, id).await?;
    require_read(&state, &user, tag.group_id).await?;

    let refs = tags::tagged_resources(&state.db, id)
        .await?
        .iter()
        .filter_map(ResourceRef::from_identity)
        .collect();
    Ok(Json(refs))
}
