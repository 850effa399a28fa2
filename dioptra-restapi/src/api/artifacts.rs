//! Artifacts: pointers to files produced by jobs
//!
//! The URI identifies an artifact and is unique within its group; only the
//! description can change afterwards.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::auth::CurrentUser;
use super::resource::{
    insert_resource, load_readable, load_writable, update_resource, view_of, CreateRequest,
    ResourceKind,
};
use super::views::ResourceView;
use crate::db::resources::ResourceType;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub struct Artifacts;

impl ResourceKind for Artifacts {
    const TYPE: ResourceType = ResourceType::Artifact;
    type Fields = ArtifactFields;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFields {
    pub uri: String,
    #[serde(default)]
    pub description: String,
    /// Job that produced the artifact
    #[serde(default)]
    pub job_id: Option<i64>,
}

/// POST /api/v1/artifacts
pub async fn create_artifact(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<ArtifactFields>>,
) -> ApiResult<Json<ResourceView<ArtifactFields>>> {
    debug!(resource = "artifact", request_type = "POST", "Request received");

    let mut fields = request.fields;
    fields.uri = fields.uri.trim().to_string();
    if fields.uri.is_empty() {
        return Err(ApiError::BadRequest("uri must not be empty".to_string()));
    }
    if let Some(job_id) = fields.job_id {
        load_readable(&state, &user, ResourceType::Job, job_id).await?;
    }

    let row = insert_resource(
        &state,
        &user,
        Artifacts::TYPE,
        request.group,
        None,
        Some(&fields.uri),
        &fields,
    )
    .await?;
    Ok(Json(view_of::<Artifacts>(&state, &row).await?))
}

#[derive(Debug, Deserialize)]
pub struct ModifyArtifactRequest {
    pub description: String,
}

/// PUT /api/v1/artifacts/:id changes the description
pub async fn modify_artifact(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<ModifyArtifactRequest>,
) -> ApiResult<Json<ResourceView<ArtifactFields>>> {
    debug!(resource = "artifact", request_type = "PUT", id, "Request received");

    let row = load_writable(&state, &user, Artifacts::TYPE, id).await?;
    let mut fields = row.fields::<ArtifactFields>()?;
    fields.description = request.description;

    let row = update_resource(&state, &user, Artifacts::TYPE, &row, Some(&fields.uri), &fields).await?;
    Ok(Json(view_of::<Artifacts>(&state, &row).await?))
}
