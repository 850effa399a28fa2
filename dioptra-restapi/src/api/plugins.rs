//! Plugins and plugin files
//!
//! A plugin is a named collection of python files. Each file lives under
//! its plugin (parent resource), shares the plugin's group, and declares
//! the tasks it provides with typed input and output parameters.

use std::collections::{BTreeSet, HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::{
    fetch_page, insert_resource, load_readable, load_writable, update_resource, view_with,
    CreateRequest, NamedFields, ResourceKind,
};
use super::views::{collection_url, resource_url, DeleteResponse, GroupRef, ResourceView};
use crate::db::resources::{self, ResourceRow, ResourceType};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::AppState;

/// A python identifier: plugin, task and task plugin names
pub static PYTHON_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// A relative path to a python module, e.g. `pkg/sub/module.py`
static PLUGIN_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*/)*[A-Za-z_][A-Za-z0-9_]*\.py$")
        .expect("filename pattern is valid")
});

pub struct Plugins;

impl ResourceKind for Plugins {
    const TYPE: ResourceType = ResourceType::Plugin;
    type Fields = NamedFields;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFileRef {
    pub id: i64,
    pub group: GroupRef,
    pub url: String,
    pub plugin_id: i64,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginBody {
    #[serde(flatten)]
    pub fields: NamedFields,
    pub files: Vec<PluginFileRef>,
}

/// Stored fields of a plugin file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFileFields {
    pub filename: String,
    pub contents: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<TaskFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub name: String,
    #[serde(default)]
    pub input_params: Vec<InputParamFields>,
    #[serde(default)]
    pub output_params: Vec<OutputParamFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParamFields {
    pub name: String,
    pub parameter_type_id: i64,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParamFields {
    pub name: String,
    pub parameter_type_id: i64,
}

impl PluginFileFields {
    /// Every parameter type referenced by the file's tasks
    pub fn parameter_type_ids(&self) -> BTreeSet<i64> {
        self.tasks
            .iter()
            .flat_map(|task| {
                task.input_params
                    .iter()
                    .map(|p| p.parameter_type_id)
                    .chain(task.output_params.iter().map(|p| p.parameter_type_id))
            })
            .collect()
    }

    pub fn uses_parameter_type(&self, parameter_type_id: i64) -> bool {
        self.parameter_type_ids().contains(&parameter_type_id)
    }

    /// Check the filename and the shape of the task declarations
    fn validate(&self) -> ApiResult<()> {
        if !PLUGIN_FILENAME.is_match(&self.filename) {
            return Err(ApiError::BadRequest(format!(
                "{} is not a valid python module path",
                self.filename
            )));
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !PYTHON_IDENTIFIER.is_match(&task.name) {
                return Err(ApiError::BadRequest(format!(
                    "Task name {} is not a python identifier",
                    task.name
                )));
            }
            if !task_names.insert(task.name.as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "Task {} is declared twice",
                    task.name
                )));
            }

            let mut inputs = HashSet::new();
            for param in &task.input_params {
                if !inputs.insert(param.name.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "Input parameter {} of task {} is declared twice",
                        param.name, task.name
                    )));
                }
            }
            let mut outputs = HashSet::new();
            for param in &task.output_params {
                if !outputs.insert(param.name.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "Output parameter {} of task {} is declared twice",
                        param.name, task.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterTypeRef {
    pub id: i64,
    pub group: GroupRef,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParamView {
    pub name: String,
    pub parameter_type: ParameterTypeRef,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParamView {
    pub name: String,
    pub parameter_type: ParameterTypeRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub name: String,
    pub input_params: Vec<InputParamView>,
    pub output_params: Vec<OutputParamView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFileBody {
    pub plugin_id: i64,
    pub filename: String,
    pub contents: String,
    pub description: String,
    pub tasks: Vec<TaskView>,
}

fn validate_plugin(fields: NamedFields) -> ApiResult<NamedFields> {
    let fields = fields.validated()?;
    if !PYTHON_IDENTIFIER.is_match(&fields.name) {
        return Err(ApiError::BadRequest(format!(
            "Plugin name {} is not a python identifier",
            fields.name
        )));
    }
    Ok(fields)
}

fn file_ref(row: &ResourceRow, plugin_id: i64) -> ApiResult<PluginFileRef> {
    Ok(PluginFileRef {
        id: row.resource_id,
        group: GroupRef::new(row.group_id, row.group_name.clone()),
        url: resource_url(ResourceType::PluginFile, row.resource_id, Some(plugin_id)),
        plugin_id,
        filename: row.name.clone().unwrap_or_default(),
    })
}

async fn plugin_view(state: &AppState, row: &ResourceRow) -> ApiResult<ResourceView<PluginBody>> {
    let fields = row.fields::<NamedFields>()?;
    let files = resources::children(&state.db, ResourceType::PluginFile, row.resource_id)
        .await?
        .iter()
        .map(|file| file_ref(file, row.resource_id))
        .collect::<ApiResult<Vec<_>>>()?;
    view_with(state, Plugins::TYPE, row, PluginBody { fields, files }).await
}

/// Resolve the parameter types of a file, keyed by id
async fn parameter_type_refs(
    state: &AppState,
    fields: &PluginFileFields,
) -> ApiResult<HashMap<i64, ParameterTypeRef>> {
    let mut refs = HashMap::new();
    for id in fields.parameter_type_ids() {
        let identity = resources::identity(&state.db, id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Parameter type {} is missing", id)))?;
        refs.insert(
            id,
            ParameterTypeRef {
                id,
                group: GroupRef::new(identity.group_id, identity.group_name),
                url: resource_url(ResourceType::PluginParameterType, id, None),
                name: identity.name.unwrap_or_default(),
            },
        );
    }
    Ok(refs)
}

async fn file_view(state: &AppState, row: &ResourceRow) -> ApiResult<ResourceView<PluginFileBody>> {
    let fields = row.fields::<PluginFileFields>()?;
    let refs = parameter_type_refs(state, &fields).await?;
    let lookup = |id: i64| {
        refs.get(&id)
            .cloned()
            .ok_or_else(|| ApiError::Internal(format!("Parameter type {} is missing", id)))
    };

    let mut tasks = Vec::with_capacity(fields.tasks.len());
    for task in &fields.tasks {
        let input_params = task
            .input_params
            .iter()
            .map(|p| {
                Ok::<_, ApiError>(InputParamView {
                    name: p.name.clone(),
                    parameter_type: lookup(p.parameter_type_id)?,
                    required: p.required,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        let output_params = task
            .output_params
            .iter()
            .map(|p| {
                Ok::<_, ApiError>(OutputParamView {
                    name: p.name.clone(),
                    parameter_type: lookup(p.parameter_type_id)?,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;
        tasks.push(TaskView {
            name: task.name.clone(),
            input_params,
            output_params,
        });
    }

    let body = PluginFileBody {
        plugin_id: row.parent_id.unwrap_or_default(),
        filename: fields.filename,
        contents: fields.contents,
        description: fields.description,
        tasks,
    };
    view_with(state, ResourceType::PluginFile, row, body).await
}

/// Every parameter type a file uses must be a live type in the plugin's group
async fn check_parameter_types(
    state: &AppState,
    fields: &PluginFileFields,
    group_id: i64,
) -> ApiResult<()> {
    for id in fields.parameter_type_ids() {
        match resources::get(&state.db, ResourceType::PluginParameterType, id).await? {
            Some(row) if row.group_id == group_id => {}
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "Plugin parameter type {} does not exist in group {}",
                    id, group_id
                )))
            }
        }
    }
    Ok(())
}

/// GET /api/v1/plugins
pub async fn list_plugins(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<PluginBody>>>> {
    debug!(resource = "plugin", request_type = "GET", "Request received");

    let (rows, total, paging) = fetch_page(&state, &user, Plugins::TYPE, &query, None).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(plugin_view(&state, row).await?);
    }

    Ok(Json(Page::new(
        &collection_url(Plugins::TYPE),
        &query,
        paging,
        views,
        total,
    )))
}

/// POST /api/v1/plugins
pub async fn create_plugin(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<NamedFields>>,
) -> ApiResult<Json<ResourceView<PluginBody>>> {
    debug!(resource = "plugin", request_type = "POST", "Request received");

    let fields = validate_plugin(request.fields)?;
    let row = insert_resource(
        &state,
        &user,
        Plugins::TYPE,
        request.group,
        None,
        Some(&fields.name),
        &fields,
    )
    .await?;
    Ok(Json(plugin_view(&state, &row).await?))
}

/// GET /api/v1/plugins/:id
pub async fn get_plugin(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResourceView<PluginBody>>> {
    let row = load_readable(&state, &user, Plugins::TYPE, id).await?;
    Ok(Json(plugin_view(&state, &row).await?))
}

/// PUT /api/v1/plugins/:id
pub async fn modify_plugin(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(fields): Json<NamedFields>,
) -> ApiResult<Json<ResourceView<PluginBody>>> {
    debug!(resource = "plugin", request_type = "PUT", id, "Request received");

    let fields = validate_plugin(fields)?;
    let row = load_writable(&state, &user, Plugins::TYPE, id).await?;
    let row = update_resource(&state, &user, Plugins::TYPE, &row, Some(&fields.name), &fields).await?;
    Ok(Json(plugin_view(&state, &row).await?))
}

/// Load a file of a plugin, checking read or write access via the plugin
async fn load_file(
    state: &AppState,
    user: &CurrentUser,
    plugin_id: i64,
    file_id: i64,
    write: bool,
) -> ApiResult<ResourceRow> {
    if write {
        load_writable(state, user, Plugins::TYPE, plugin_id).await?;
    } else {
        load_readable(state, user, Plugins::TYPE, plugin_id).await?;
    }

    resources::get(&state.db, ResourceType::PluginFile, file_id)
        .await?
        .filter(|row| row.parent_id == Some(plugin_id))
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Plugin file {} of plugin {} not found",
                file_id, plugin_id
            ))
        })
}

/// GET /api/v1/plugins/:id/files
pub async fn list_files(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(plugin_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<PluginFileBody>>>> {
    debug!(resource = "plugin_file", request_type = "GET", plugin_id, "Request received");

    load_readable(&state, &user, Plugins::TYPE, plugin_id).await?;
    let (rows, total, paging) =
        fetch_page(&state, &user, ResourceType::PluginFile, &query, Some(plugin_id)).await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(file_view(&state, row).await?);
    }

    let route = format!("{}/files", resource_url(Plugins::TYPE, plugin_id, None));
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

/// POST /api/v1/plugins/:id/files
pub async fn create_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(plugin_id): Path<i64>,
    Json(fields): Json<PluginFileFields>,
) -> ApiResult<Json<ResourceView<PluginFileBody>>> {
    debug!(resource = "plugin_file", request_type = "POST", plugin_id, "Request received");

    let plugin = load_writable(&state, &user, Plugins::TYPE, plugin_id).await?;
    fields.validate()?;
    check_parameter_types(&state, &fields, plugin.group_id).await?;

    let row = insert_resource(
        &state,
        &user,
        ResourceType::PluginFile,
        plugin.group_id,
        Some(plugin_id),
        Some(&fields.filename),
        &fields,
    )
    .await?;
    Ok(Json(file_view(&state, &row).await?))
}

/// GET /api/v1/plugins/:id/files/:file_id
pub async fn get_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((plugin_id, file_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ResourceView<PluginFileBody>>> {
    let row = load_file(&state, &user, plugin_id, file_id, false).await?;
    Ok(Json(file_view(&state, &row).await?))
}

/// PUT /api/v1/plugins/:id/files/:file_id
pub async fn modify_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((plugin_id, file_id)): Path<(i64, i64)>,
    Json(fields): Json<PluginFileFields>,
) -> ApiResult<Json<ResourceView<PluginFileBody>>> {
    debug!(resource = "plugin_file", request_type = "PUT", plugin_id, file_id, "Request received");

    let row = load_file(&state, &user, plugin_id, file_id, true).await?;
    fields.validate()?;
    check_parameter_types(&state, &fields, row.group_id).await?;

    let row = update_resource(
        &state,
        &user,
        ResourceType::PluginFile,
        &row,
        Some(&fields.filename),
        &fields,
    )
    .await?;
    Ok(Json(file_view(&state, &row).await?))
}

/// DELETE /api/v1/plugins/:id/files/:file_id
pub async fn delete_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((plugin_id, file_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "plugin_file", request_type = "DELETE", plugin_id, file_id, "Request received");

    load_file(&state, &user, plugin_id, file_id, true).await?;
    resources::soft_delete(&state.db, ResourceType::PluginFile, file_id).await?;
    info!(resource = "plugin_file", id = file_id, plugin_id, "Resource deleted");

    Ok(Json(DeleteResponse::new(file_id)))
}

/// GET /api/v1/plugins/:id/files/:file_id/snapshots
pub async fn list_file_snapshots(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((plugin_id, file_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<PluginFileBody>>>> {
    load_file(&state, &user, plugin_id, file_id, false).await?;
    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (rows, total) = resources::list_snapshots(
        &state.db,
        ResourceType::PluginFile,
        file_id,
        paging.index,
        paging.page_length,
    )
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(file_view(&state, row).await?);
    }

    let route = format!(
        "{}/snapshots",
        resource_url(ResourceType::PluginFile, file_id, Some(plugin_id))
    );
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

/// GET /api/v1/plugins/:id/files/:file_id/snapshots/:snapshot_id
pub async fn get_file_snapshot(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((plugin_id, file_id, snapshot_id)): Path<(i64, i64, i64)>,
) -> ApiResult<Json<ResourceView<PluginFileBody>>> {
    load_file(&state, &user, plugin_id, file_id, false).await?;
    let row = resources::get_snapshot(&state.db, ResourceType::PluginFile, file_id, snapshot_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Snapshot {} of plugin file {} not found",
                snapshot_id, file_id
            ))
        })?;
    Ok(Json(file_view(&state, &row).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(filename: &str, tasks: Vec<TaskFields>) -> PluginFileFields {
        PluginFileFields {
            filename: filename.to_string(),
            contents: String::new(),
            description: String::new(),
            tasks,
        }
    }

    fn task(name: &str, inputs: &[(&str, i64)], outputs: &[(&str, i64)]) -> TaskFields {
        TaskFields {
            name: name.to_string(),
            input_params: inputs
                .iter()
                .map(|(name, id)| InputParamFields {
                    name: name.to_string(),
                    parameter_type_id: *id,
                    required: true,
                })
                .collect(),
            output_params: outputs
                .iter()
                .map(|(name, id)| OutputParamFields {
                    name: name.to_string(),
                    parameter_type_id: *id,
                })
                .collect(),
        }
    }

    #[test]
    fn test_filename_pattern() {
        assert!(file("tasks.py", vec![]).validate().is_ok());
        assert!(file("pkg/sub/_mod.py", vec![]).validate().is_ok());
        assert!(file("/abs.py", vec![]).validate().is_err());
        assert!(file("1bad.py", vec![]).validate().is_err());
        assert!(file("tasks.txt", vec![]).validate().is_err());
        assert!(file("pkg/../x.py", vec![]).validate().is_err());
    }

    #[test]
    fn test_duplicate_tasks_and_params_rejected() {
        let dup_task = file("a.py", vec![task("t", &[], &[]), task("t", &[], &[])]);
        assert!(dup_task.validate().is_err());

        let dup_input = file("a.py", vec![task("t", &[("x", 1), ("x", 2)], &[])]);
        assert!(dup_input.validate().is_err());

        let same_name_in_and_out = file("a.py", vec![task("t", &[("x", 1)], &[("x", 1)])]);
        assert!(same_name_in_and_out.validate().is_ok());
    }

    #[test]
    fn test_parameter_type_ids_collected() {
        let fields = file(
            "a.py",
            vec![task("t", &[("x", 3), ("y", 1)], &[("z", 3)]), task("u", &[], &[("w", 5)])],
        );
        let ids: Vec<i64> = fields.parameter_type_ids().into_iter().collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert!(fields.uses_parameter_type(5));
        assert!(!fields.uses_parameter_type(2));
    }

    #[test]
    fn test_input_params_required_by_default() {
        let param: InputParamFields =
            serde_json::from_str(r#"{"name": "x", "parameterTypeId": 1}"#).unwrap();
        assert!(param.required);
    }

    #[test]
    fn test_python_identifier() {
        assert!(PYTHON_IDENTIFIER.is_match("my_plugin2"));
        assert!(!PYTHON_IDENTIFIER.is_match("my-plugin"));
        assert!(!PYTHON_IDENTIFIER.is_match("2plugin"));
    }
}
