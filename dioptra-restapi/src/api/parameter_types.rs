//! Plugin parameter types
//!
//! Named types that plugin task parameters refer to. A type cannot be
//! deleted while a live plugin file in its group still uses it.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::plugins::PluginFileFields;
use super::resource::{
    insert_resource, load_writable, not_found, update_resource, validate_name, view_of,
    CreateRequest, ResourceKind,
};
use super::views::{DeleteResponse, ResourceView};
use crate::db::resources::{self, ResourceType};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub struct ParameterTypes;

impl ResourceKind for ParameterTypes {
    const TYPE: ResourceType = ResourceType::PluginParameterType;
    type Fields = ParameterTypeFields;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTypeFields {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Optional JSON description of the type's shape
    #[serde(default)]
    pub structure: Option<Value>,
}

impl ParameterTypeFields {
    fn validated(self) -> ApiResult<Self> {
        Ok(Self {
            name: validate_name(&self.name)?,
            ..self
        })
    }
}

/// POST /api/v1/pluginParameterTypes
pub async fn create_parameter_type(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<ParameterTypeFields>>,
) -> ApiResult<Json<ResourceView<ParameterTypeFields>>> {
    debug!(resource = "plugin_task_parameter_type", request_type = "POST", "Request received");

    let fields = request.fields.validated()?;
    let row = insert_resource(
        &state,
        &user,
        ParameterTypes::TYPE,
        request.group,
        None,
        Some(&fields.name),
        &fields,
    )
    .await?;
    Ok(Json(view_of::<ParameterTypes>(&state, &row).await?))
}

/// PUT /api/v1/pluginParameterTypes/:id
pub async fn modify_parameter_type(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(fields): Json<ParameterTypeFields>,
) -> ApiResult<Json<ResourceView<ParameterTypeFields>>> {
    debug!(resource = "plugin_task_parameter_type", request_type = "PUT", id, "Request received");

    let fields = fields.validated()?;
    let row = load_writable(&state, &user, ParameterTypes::TYPE, id).await?;
    let row = update_resource(&state, &user, ParameterTypes::TYPE, &row, Some(&fields.name), &fields)
        .await?;
    Ok(Json(view_of::<ParameterTypes>(&state, &row).await?))
}

/// DELETE /api/v1/pluginParameterTypes/:id
pub async fn delete_parameter_type(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "plugin_task_parameter_type", request_type = "DELETE", id, "Request received");

    let row = load_writable(&state, &user, ParameterTypes::TYPE, id).await?;

    let files = resources::in_group(&state.db, ResourceType::PluginFile, row.group_id).await?;
    for file in &files {
        let fields = file.fields::<PluginFileFields>()?;
        if fields.uses_parameter_type(id) {
            return Err(ApiError::Conflict(format!(
                "Plugin parameter type {} is used by plugin file {}",
                id, file.resource_id
            )));
        }
    }

    if !resources::soft_delete(&state.db, ParameterTypes::TYPE, id).await? {
        return Err(not_found(ParameterTypes::TYPE, id));
    }
    info!(resource = "plugin_task_parameter_type", id, "Resource deleted");

    Ok(Json(DeleteResponse::new(id)))
}
