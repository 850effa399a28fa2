//! Jobs: records of work submitted to a queue for an experiment
//!
//! Nothing here executes a job. A job carries its entry point settings and a
//! status that workers report back through `/jobs/:id/status`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use dioptra_common::time;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::{
    fetch_page, insert_resource, load_readable, load_writable, view_with, CreateRequest,
    ResourceKind,
};
use super::views::{collection_url, ResourceRef, ResourceView};
use crate::db::jobs as job_db;
use crate::db::queues;
use crate::db::resources::{self, ResourceRow, ResourceType};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::AppState;

pub const DEFAULT_TIMEOUT: &str = "24h";

/// Status given to every new job
pub const INITIAL_STATUS: &str = "queued";

pub const JOB_STATUSES: [&str; 5] = ["queued", "started", "deferred", "failed", "finished"];

static TIMEOUT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[hms]$").expect("timeout pattern is valid"));

pub struct Jobs;

impl ResourceKind for Jobs {
    const TYPE: ResourceType = ResourceType::Job;
    type Fields = JobFields;
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn empty_kwargs() -> Value {
    Value::Object(Default::default())
}

/// Stored fields of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFields {
    pub queue_id: i64,
    pub experiment_id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    pub entry_point: String,
    #[serde(default = "empty_kwargs")]
    pub entry_point_kwargs: Value,
    #[serde(default)]
    pub depends_on: Option<i64>,
}

impl JobFields {
    fn validated(mut self) -> ApiResult<Self> {
        self.entry_point = self.entry_point.trim().to_string();
        if self.entry_point.is_empty() {
            return Err(ApiError::BadRequest("Entry point must not be empty".to_string()));
        }
        if !TIMEOUT_PATTERN.is_match(&self.timeout) {
            return Err(ApiError::BadRequest(format!(
                "Timeout {} must be a number followed by h, m or s",
                self.timeout
            )));
        }
        if !self.entry_point_kwargs.is_object() {
            return Err(ApiError::BadRequest(
                "Entry point kwargs must be a JSON object".to_string(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBody {
    pub queue: ResourceRef,
    pub experiment: ResourceRef,
    pub description: String,
    pub timeout: String,
    pub entry_point: String,
    pub entry_point_kwargs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<i64>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub id: Option<i64>,
    pub status: String,
}

/// Reference to a job's queue or experiment, which may since have been deleted
async fn related_ref(state: &AppState, ty: ResourceType, id: i64) -> ApiResult<ResourceRef> {
    resources::identity(&state.db, id)
        .await?
        .and_then(|identity| ResourceRef::from_identity(&identity))
        .ok_or_else(|| ApiError::Internal(format!("{} {} is missing", ty.label(), id)))
}

async fn job_view(state: &AppState, row: &ResourceRow) -> ApiResult<ResourceView<JobBody>> {
    let fields = row.fields::<JobFields>()?;
    let status = job_db::status(&state.db, row.resource_id)
        .await?
        .unwrap_or_else(|| INITIAL_STATUS.to_string());

    let body = JobBody {
        queue: related_ref(state, ResourceType::Queue, fields.queue_id).await?,
        experiment: related_ref(state, ResourceType::Experiment, fields.experiment_id).await?,
        description: fields.description,
        timeout: fields.timeout,
        entry_point: fields.entry_point,
        entry_point_kwargs: fields.entry_point_kwargs,
        depends_on: fields.depends_on,
        status,
    };
    view_with(state, Jobs::TYPE, row, body).await
}

/// GET /api/v1/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ResourceView<JobBody>>>> {
    debug!(resource = "job", request_type = "GET", "Request received");

    let (rows, total, paging) = fetch_page(&state, &user, Jobs::TYPE, &query, None).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(job_view(&state, row).await?);
    }

    Ok(Json(Page::new(
        &collection_url(Jobs::TYPE),
        &query,
        paging,
        views,
        total,
    )))
}

/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateRequest<JobFields>>,
) -> ApiResult<Json<ResourceView<JobBody>>> {
    debug!(resource = "job", request_type = "POST", "Request received");

    let fields = request.fields.validated()?;

    let queue = load_readable(&state, &user, ResourceType::Queue, fields.queue_id).await?;
    if queues::is_locked(&state.db, queue.resource_id).await? {
        return Err(ApiError::BadRequest(format!(
            "Queue {} is locked",
            queue.resource_id
        )));
    }
    load_readable(&state, &user, ResourceType::Experiment, fields.experiment_id).await?;
    if let Some(depends_on) = fields.depends_on {
        load_readable(&state, &user, Jobs::TYPE, depends_on).await?;
    }

    let row = insert_resource(&state, &user, Jobs::TYPE, request.group, None, None, &fields).await?;
    job_db::set_status(&state.db, row.resource_id, INITIAL_STATUS, time::now()).await?;
    info!(
        id = row.resource_id,
        queue_id = fields.queue_id,
        experiment_id = fields.experiment_id,
        "Job submitted"
    );

    Ok(Json(job_view(&state, &row).await?))
}

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResourceView<JobBody>>> {
    let row = load_readable(&state, &user, Jobs::TYPE, id).await?;
    Ok(Json(job_view(&state, &row).await?))
}

/// GET /api/v1/jobs/:id/status
pub async fn get_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<StatusBody>> {
    load_readable(&state, &user, Jobs::TYPE, id).await?;
    let status = job_db::status(&state.db, id)
        .await?
        .unwrap_or_else(|| INITIAL_STATUS.to_string());
    Ok(Json(StatusBody {
        id: Some(id),
        status,
    }))
}

/// PUT /api/v1/jobs/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<StatusBody>,
) -> ApiResult<Json<StatusBody>> {
    debug!(resource = "job", request_type = "PUT", id, status = %request.status, "Request received");

    if !JOB_STATUSES.contains(&request.status.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unknown job status {}; expected one of {}",
            request.status,
            JOB_STATUSES.join(", ")
        )));
    }

    load_writable(&state, &user, Jobs::TYPE, id).await?;
    job_db::set_status(&state.db, id, &request.status, time::now()).await?;
    info!(id, status = %request.status, "Job status changed");

    Ok(Json(StatusBody {
        id: Some(id),
        status: request.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(json: &str) -> JobFields {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let job = fields(r#"{"queueId": 1, "experimentId": 2, "entryPoint": "main"}"#);
        assert_eq!(job.timeout, "24h");
        assert_eq!(job.entry_point_kwargs, serde_json::json!({}));
        assert!(job.depends_on.is_none());
        assert!(job.validated().is_ok());
    }

    #[test]
    fn test_timeout_format() {
        for ok in ["1h", "30m", "45s", "100h"] {
            let job = fields(&format!(
                r#"{{"queueId": 1, "experimentId": 2, "entryPoint": "main", "timeout": "{}"}}"#,
                ok
            ));
            assert!(job.validated().is_ok(), "{} should be accepted", ok);
        }
        for bad in ["", "h", "1d", "1.5h", "10 m"] {
            let job = fields(&format!(
                r#"{{"queueId": 1, "experimentId": 2, "entryPoint": "main", "timeout": "{}"}}"#,
                bad
            ));
            assert!(job.validated().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_entry_point_required() {
        let job = fields(r#"{"queueId": 1, "experimentId": 2, "entryPoint": "  "}"#);
        assert!(job.validated().is_err());
    }

    #[test]
    fn test_kwargs_must_be_object() {
        let job = fields(
            r#"{"queueId": 1, "experimentId": 2, "entryPoint": "main", "entryPointKwargs": [1]}"#,
        );
        assert!(job.validated().is_err());
    }
}
