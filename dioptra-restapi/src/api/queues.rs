//! Queues and queue locks
//!
//! Queues are plain named resources served by the generic handlers. A
//! locked queue refuses new jobs until it is unlocked.

use axum::{
    extract::{Path, State},
    Json,
};
use dioptra_common::time;
use serde::Serialize;
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::{load_readable, load_writable, NamedFields, ResourceKind};
use crate::db::queues;
use crate::db::resources::ResourceType;
use crate::error::ApiResult;
use crate::AppState;

pub struct Queues;

impl ResourceKind for Queues {
    const TYPE: ResourceType = ResourceType::Queue;
    type Fields = NamedFields;
}

/// Lock state of a queue
#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub id: i64,
    pub locked: bool,
}

/// GET /api/v1/queues/:id/lock
pub async fn get_lock(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<LockResponse>> {
    load_readable(&state, &user, ResourceType::Queue, id).await?;
    let locked = queues::is_locked(&state.db, id).await?;
    Ok(Json(LockResponse { id, locked }))
}

/// PUT /api/v1/queues/:id/lock
pub async fn lock_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<LockResponse>> {
    debug!(resource = "queue", request_type = "PUT", id, "Lock request received");

    load_writable(&state, &user, ResourceType::Queue, id).await?;
    queues::lock(&state.db, id, time::now()).await?;
    info!(queue_id = id, "Queue locked");

    Ok(Json(LockResponse { id, locked: true }))
}

/// DELETE /api/v1/queues/:id/lock
pub async fn unlock_queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<LockResponse>> {
    debug!(resource = "queue", request_type = "DELETE", id, "Unlock request received");

    load_writable(&state, &user, ResourceType::Queue, id).await?;
    queues::unlock(&state.db, id).await?;
    info!(queue_id = id, "Queue unlocked");

    Ok(Json(LockResponse { id, locked: false }))
}
