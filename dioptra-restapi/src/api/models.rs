//! Models and their registered versions
//!
//! A model is a named resource without snapshot history. Each registered
//! version points at an artifact; version numbers start at 1 and grow by
//! one per registration.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use dioptra_common::time;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::{
    fetch_page, insert_resource, load_readable, load_writable, update_resource, view_with,
    CreateRequest, NamedFields, ResourceKind,
};
use super::views::{collection_url, resource_url, GroupRef, ResourceView, UserRef};
use crate::db::models::{self, VersionRecord};
use crate::db::resources::{self, ResourceRow, ResourceType};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::AppState;

pub struct Models;

impl ResourceKind for Models {
    const TYPE: ResourceType = ResourceType::Model;
    type Fields = NamedFields;
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRef {
    pub id: i64,
    pub group: GroupRef,
    pub url: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionView {
    pub model_id: i64,
    pub version_number: i64,
    pub description: String,
    pub artifact: ArtifactRef,
    pub group: GroupRef,
    pub user: UserRef,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBody {
    #[serde(flatten)]
    pub fields: NamedFields,
    pub last_version: Option<VersionView>,
}

async fn version_view(
    state: &AppState,
    model: &ResourceRow,
    version: &VersionRecord,
) -> ApiResult<VersionView> {
    let artifact = resources::identity(&state.db, version.artifact_id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("Artifact {} is missing", version.artifact_id))
        })?;

    Ok(VersionView {
        model_id: version.model_id,
        version_number: version.version_number,
        description: version.description.clone(),
        artifact: ArtifactRef {
            id: artifact.resource_id,
            group: GroupRef::new(artifact.group_id, artifact.group_name),
            url: resource_url(ResourceType::Artifact, artifact.resource_id, None),
            uri: artifact.name.unwrap_or_default(),
        },
        group: GroupRef::new(model.group_id, model.group_name.clone()),
        user: UserRef::new(version.creator_id, version.creator_username.clone()),
        created_on: version.created_on,
        last_modified_on: version.last_modified_on,
    })
}

async fn model_view(state: &AppState, row: &ResourceRow) -> ApiResult<ResourceView<ModelBody>> {
    let fields = row.fields::<NamedFields>()?;
    let last_version = match models::latest(&state.db, row.resource_id).await? {
        Some(version) => Some(version_view(state, row, &version).await?),
        None => None,
    };
    view_with(state, Models::TYPE, row, ModelBody { fields, last_version }).await
}

/// GET /api/v1/models
pub async fn list_models(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<ModelBody>>>> {
    debug!(resource = "model", request_type = "GET", "Request received");

    let (rows, total, paging) = fetch_page(&state, &user, Models::TYPE, &query, None).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(model_view(&state, row).await?);
    }

    Ok(Json(Page::new(
        &collection_url(Models::TYPE),
        &query,
        paging,
        views,
        total,
    )))
}

/// POST /api/v1/models
pub async fn create_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<NamedFields>>,
) -> ApiResult<Json<ResourceView<ModelBody>>> {
    debug!(resource = "model", request_type = "POST", "Request received");

    let fields = request.fields.validated()?;
    let row = insert_resource(
        &state,
        &user,
        Models::TYPE,
        request.group,
        None,
        Some(&fields.name),
        &fields,
    )
    .await?;
    Ok(Json(model_view(&state, &row).await?))
}

/// GET /api/v1/models/:id
pub async fn get_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResourceView<ModelBody>>> {
    let row = load_readable(&state, &user, Models::TYPE, id).await?;
    Ok(Json(model_view(&state, &row).await?))
}

/// PUT /api/v1/models/:id
pub async fn modify_model(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(fields): Json<NamedFields>,
) -> ApiResult<Json<ResourceView<ModelBody>>> {
    debug!(resource = "model", request_type = "PUT", id, "Request received");

    let fields = fields.validated()?;
    let row = load_writable(&state, &user, Models::TYPE, id).await?;
    let row = update_resource(&state, &user, Models::TYPE, &row, Some(&fields.name), &fields).await?;
    Ok(Json(model_view(&state, &row).await?))
}

/// GET /api/v1/models/:id/versions
pub async fn list_versions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<VersionView>>> {
    let model = load_readable(&state, &user, Models::TYPE, id).await?;
    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (versions, total) = models::list(&state.db, id, paging.index, paging.page_length).await?;

    let mut views = Vec::with_capacity(versions.len());
    for version in &versions {
        views.push(version_view(&state, &model, version).await?);
    }

    let route = format!("{}/versions", resource_url(Models::TYPE, id, None));
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub artifact_id: i64,
    #[serde(default)]
    pub description: String,
}

/// POST /api/v1/models/:id/versions
pub async fn create_version(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<CreateVersionRequest>,
) -> ApiResult<Json<VersionView>> {
    debug!(resource = "model_version", request_type = "POST", id, "Request received");

    let model = load_writable(&state, &user, Models::TYPE, id).await?;
    load_readable(&state, &user, ResourceType::Artifact, request.artifact_id).await?;

    let version_number = models::create(
        &state.db,
        id,
        request.artifact_id,
        &request.description,
        user.id(),
        time::now(),
    )
    .await?;
    info!(model_id = id, version_number, artifact_id = request.artifact_id, "Model version registered");

    let version = load_version(&state, id, version_number).await?;
    Ok(Json(version_view(&state, &model, &version).await?))
}

async fn load_version(state: &AppState, model_id: i64, version_number: i64) -> ApiResult<VersionRecord> {
    models::get(&state.db, model_id, version_number)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Version {} of model {} not found",
                version_number, model_id
            ))
        })
}

/// GET /api/v1/models/:id/versions/:version_number
pub async fn get_version(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, version_number)): Path<(i64, i64)>,
) -> ApiResult<Json<VersionView>> {
    let model = load_readable(&state, &user, Models::TYPE, id).await?;
    let version = load_version(&state, id, version_number).await?;
    Ok(Json(version_view(&state, &model, &version).await?))
}

#[derive(Debug, Deserialize)]
pub struct ModifyVersionRequest {
    pub description: String,
}

/// PUT /api/v1/models/:id/versions/:version_number
pub async fn modify_version(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, version_number)): Path<(i64, i64)>,
    Json(request): Json<ModifyVersionRequest>,
) -> ApiResult<Json<VersionView>> {
    debug!(resource = "model_version", request_type = "PUT", id, version_number, "Request received");

    let model = load_writable(&state, &user, Models::TYPE, id).await?;
    load_version(&state, id, version_number).await?;
    models::set_description(&state.db, id, version_number, &request.description, time::now())
        .await?;

    let version = load_version(&state, id, version_number).await?;
    Ok(Json(version_view(&state, &model, &version).await?))
}
