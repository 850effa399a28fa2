//! Legacy task plugin packages under `/api/taskPlugin`
//!
//! A package is a tar archive, optionally gzipped, of python modules
//! uploaded into one of two collections. Builtin packages can be listed and fetched but not deleted;
//! the router only exposes DELETE for the custom collection.

use std::io::Read;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use dioptra_common::time;
use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::plugins::PYTHON_IDENTIFIER;
use crate::db::task_plugins::{self, TaskPluginRecord};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const BUILTINS: &str = "dioptra_builtins";
pub const CUSTOM: &str = "dioptra_custom";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPluginView {
    pub task_plugin_name: String,
    pub collection: String,
    pub modules: Vec<String>,
}

impl From<TaskPluginRecord> for TaskPluginView {
    fn from(record: TaskPluginRecord) -> Self {
        Self {
            task_plugin_name: record.name,
            collection: record.collection,
            modules: record.modules,
        }
    }
}

/// Python modules contained in a tar archive, sorted
///
/// Gzip-compressed archives are decompressed first.
pub fn archive_modules(archive: &[u8]) -> ApiResult<Vec<String>> {
    if archive.starts_with(&GZIP_MAGIC) {
        tar_modules(GzDecoder::new(archive))
    } else {
        tar_modules(archive)
    }
}

fn tar_modules<R: Read>(reader: R) -> ApiResult<Vec<String>> {
    let invalid = |e: std::io::Error| ApiError::BadRequest(format!("Invalid tar archive: {}", e));

    let mut tar = tar::Archive::new(reader);
    let mut modules = Vec::new();
    for entry in tar.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().map_err(invalid)?.to_string_lossy().into_owned();
        // Drain the entry so a truncated archive is reported here
        std::io::copy(&mut entry, &mut std::io::sink()).map_err(invalid)?;

        let path = path.trim_start_matches("./");
        if path.ends_with(".py") {
            modules.push(path.to_string());
        }
    }

    if modules.is_empty() {
        return Err(ApiError::BadRequest(
            "Archive contains no python modules".to_string(),
        ));
    }
    modules.sort();
    Ok(modules)
}

fn validate_collection(collection: &str) -> ApiResult<()> {
    if collection == BUILTINS || collection == CUSTOM {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Collection must be {} or {}",
            BUILTINS, CUSTOM
        )))
    }
}

async fn list(state: &AppState, collection: Option<&str>) -> ApiResult<Json<Vec<TaskPluginView>>> {
    let records = task_plugins::list(&state.db, collection).await?;
    Ok(Json(records.into_iter().map(TaskPluginView::from).collect()))
}

async fn fetch(state: &AppState, collection: &str, name: &str) -> ApiResult<Json<TaskPluginView>> {
    task_plugins::get(&state.db, collection, name)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::NotFound(format!("Task plugin {}/{} not found", collection, name)))
}

/// GET /api/taskPlugin
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskPluginView>>> {
    debug!(resource = "task_plugin", request_type = "GET", "Request received");
    list(&state, None).await
}

/// GET /api/taskPlugin/dioptra_builtins
pub async fn list_builtins(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskPluginView>>> {
    list(&state, Some(BUILTINS)).await
}

/// GET /api/taskPlugin/dioptra_custom
pub async fn list_custom(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskPluginView>>> {
    list(&state, Some(CUSTOM)).await
}

/// GET /api/taskPlugin/dioptra_builtins/:name
pub async fn get_builtin(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaskPluginView>> {
    fetch(&state, BUILTINS, &name).await
}

/// GET /api/taskPlugin/dioptra_custom/:name
pub async fn get_custom(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaskPluginView>> {
    fetch(&state, CUSTOM, &name).await
}

/// DELETE /api/taskPlugin/dioptra_custom/:name
pub async fn delete_custom(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    debug!(resource = "task_plugin", request_type = "DELETE", name = %name, "Request received");

    if !task_plugins::delete(&state.db, CUSTOM, &name).await? {
        return Err(ApiError::NotFound(format!(
            "Task plugin {}/{} not found",
            CUSTOM, name
        )));
    }
    info!(collection = CUSTOM, name = %name, "Task plugin deleted");

    Ok(Json(serde_json::json!({
        "status": "Success",
        "taskPluginName": [name],
    })))
}

/// POST /api/taskPlugin (multipart form)
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<TaskPluginView>> {
    debug!(resource = "task_plugin", request_type = "POST", "Request received");

    let mut name = None;
    let mut collection = None;
    let mut archive = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed form: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "task_plugin_name" | "collection" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Malformed form: {}", e)))?;
                if field_name == "collection" {
                    collection = Some(text);
                } else {
                    name = Some(text);
                }
            }
            "task_plugin_file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Malformed form: {}", e)))?;
                archive = Some(bytes);
            }
            other => warn!(field = other, "Ignoring unexpected form field"),
        }
    }

    let missing = |field: &str| ApiError::BadRequest(format!("Missing form field {}", field));
    let name = name.ok_or_else(|| missing("task_plugin_name"))?;
    let collection = collection.ok_or_else(|| missing("collection"))?;
    let archive = archive.ok_or_else(|| missing("task_plugin_file"))?;

    validate_collection(&collection)?;
    if !PYTHON_IDENTIFIER.is_match(&name) {
        return Err(ApiError::BadRequest(format!(
            "Task plugin name {} is not a python identifier",
            name
        )));
    }
    let modules = archive_modules(&archive)?;

    let record = TaskPluginRecord {
        collection,
        name,
        modules,
    };
    task_plugins::insert(&state.db, &record, &archive, time::now()).await?;
    info!(
        collection = %record.collection,
        name = %record.name,
        modules = record.modules.len(),
        "Task plugin registered"
    );

    Ok(Json(record.into()))
}
