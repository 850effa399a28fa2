//! Groups, their members and their managers
//!
//! Members carry read/write/share permissions used by every group-owned
//! resource. Managers administer the group: admins manage members and the
//! name, owners additionally manage managers and may delete the group. A
//! group always keeps at least one owner.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use dioptra_common::time;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::CurrentUser;
use super::resource::validate_name;
use super::views::{DeleteResponse, GroupRef, IdRequest, UserRef};
use crate::db::groups::{
    self, GroupRecord, ManagerRecord, ManagerRole, MemberPermissions, MemberRecord,
};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::{AppState, API_V1};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user: UserRef,
    pub group: GroupRef,
    pub read: bool,
    pub write: bool,
    pub share_read: bool,
    pub share_write: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerView {
    pub user: UserRef,
    pub group: GroupRef,
    pub owner: bool,
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: i64,
    pub name: String,
    pub user: UserRef,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
    pub members: Vec<MemberView>,
    pub managers: Vec<ManagerView>,
}

fn member_view(group: &GroupRef, member: &MemberRecord) -> MemberView {
    MemberView {
        user: UserRef::new(member.user_id, member.username.clone()),
        group: group.clone(),
        read: member.permissions.read,
        write: member.permissions.write,
        share_read: member.permissions.share_read,
        share_write: member.permissions.share_write,
    }
}

fn manager_view(group: &GroupRef, manager: &ManagerRecord) -> ManagerView {
    ManagerView {
        user: UserRef::new(manager.user_id, manager.username.clone()),
        group: group.clone(),
        owner: manager.role.owner,
        admin: manager.role.admin,
    }
}

async fn group_view(state: &AppState, group: &GroupRecord) -> ApiResult<GroupView> {
    let group_ref = GroupRef::new(group.group_id, group.name.clone());
    let members = groups::members(&state.db, group.group_id).await?;
    let managers = groups::managers(&state.db, group.group_id).await?;

    Ok(GroupView {
        id: group.group_id,
        name: group.name.clone(),
        user: UserRef::new(group.creator_id, group.creator_username.clone()),
        created_on: group.created_on,
        last_modified_on: group.last_modified_on,
        members: members.iter().map(|m| member_view(&group_ref, m)).collect(),
        managers: managers.iter().map(|m| manager_view(&group_ref, m)).collect(),
    })
}

async fn load_group(state: &AppState, group_id: i64) -> ApiResult<GroupRecord> {
    groups::get(&state.db, group_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Group {} not found", group_id)))
}

/// Load a group the user is a member of
async fn load_as_member(state: &AppState, user: &CurrentUser, group_id: i64) -> ApiResult<GroupRecord> {
    let group = load_group(state, group_id).await?;
    if groups::permissions(&state.db, group_id, user.id()).await?.is_none() {
        return Err(ApiError::Forbidden(format!(
            "Not a member of group {}",
            group_id
        )));
    }
    Ok(group)
}

/// Load a group the user administers (admins and owners)
async fn load_as_admin(state: &AppState, user: &CurrentUser, group_id: i64) -> ApiResult<GroupRecord> {
    let group = load_group(state, group_id).await?;
    match groups::manager(&state.db, group_id, user.id()).await? {
        Some(manager) if manager.role.admin || manager.role.owner => Ok(group),
        _ => Err(ApiError::Forbidden(format!(
            "Admin role in group {} required",
            group_id
        ))),
    }
}

/// Load a group the user owns
async fn load_as_owner(state: &AppState, user: &CurrentUser, group_id: i64) -> ApiResult<GroupRecord> {
    let group = load_group(state, group_id).await?;
    match groups::manager(&state.db, group_id, user.id()).await? {
        Some(manager) if manager.role.owner => Ok(group),
        _ => Err(ApiError::Forbidden(format!(
            "Owner role in group {} required",
            group_id
        ))),
    }
}

async fn ensure_user_exists(state: &AppState, user_id: i64) -> ApiResult<()> {
    if users::get_by_id(&state.db, user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {} not found", user_id)));
    }
    Ok(())
}

fn last_owner_error(group_id: i64, user_id: i64) -> ApiError {
    ApiError::BadRequest(format!(
        "User {} is the last owner of group {}",
        user_id, group_id
    ))
}

#[derive(Debug, Deserialize)]
pub struct GroupNameRequest {
    pub name: String,
}

/// Member permissions; omitted flags keep their current (or default) value
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsRequest {
    pub read: Option<bool>,
    pub write: Option<bool>,
    pub share_read: Option<bool>,
    pub share_write: Option<bool>,
}

impl PermissionsRequest {
    fn apply(&self, base: MemberPermissions) -> MemberPermissions {
        MemberPermissions {
            read: self.read.unwrap_or(base.read),
            write: self.write.unwrap_or(base.write),
            share_read: self.share_read.unwrap_or(base.share_read),
            share_write: self.share_write.unwrap_or(base.share_write),
        }
    }
}

/// Permissions of a newly added member
const DEFAULT_MEMBER: MemberPermissions = MemberPermissions {
    read: true,
    write: false,
    share_read: false,
    share_write: false,
};

/// Manager role; omitted flags keep their current (or default) value
#[derive(Debug, Default, Deserialize)]
pub struct RoleRequest {
    pub owner: Option<bool>,
    pub admin: Option<bool>,
}

impl RoleRequest {
    fn apply(&self, base: ManagerRole) -> ManagerRole {
        ManagerRole {
            owner: self.owner.unwrap_or(base.owner),
            admin: self.admin.unwrap_or(base.admin),
        }
    }
}

/// Role of a newly added manager
const DEFAULT_MANAGER: ManagerRole = ManagerRole {
    owner: false,
    admin: true,
};

/// GET /api/v1/groups
pub async fn list_groups(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<GroupView>>> {
    debug!(resource = "group", request_type = "GET", "Request received");

    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (records, total) = groups::list_for_user(
        &state.db,
        user.id(),
        query.search_term(),
        paging.index,
        paging.page_length,
    )
    .await?;

    let mut views = Vec::with_capacity(records.len());
    for record in &records {
        views.push(group_view(&state, record).await?);
    }

    let route = format!("{}/groups", API_V1);
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

/// POST /api/v1/groups
pub async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<GroupNameRequest>,
) -> ApiResult<Json<GroupView>> {
    debug!(resource = "group", request_type = "POST", "Request received");

    let name = validate_name(&request.name)?;
    let group_id = groups::create(&state.db, &name, user.id(), time::now()).await?;
    info!(group_id, name = %name, creator_id = user.id(), "Group created");

    let group = load_group(&state, group_id).await?;
    Ok(Json(group_view(&state, &group).await?))
}

/// GET /api/v1/groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<GroupView>> {
    let group = load_as_member(&state, &user, id).await?;
    Ok(Json(group_view(&state, &group).await?))
}

/// PUT /api/v1/groups/:id
pub async fn modify_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<GroupNameRequest>,
) -> ApiResult<Json<GroupView>> {
    debug!(resource = "group", request_type = "PUT", id, "Request received");

    load_as_admin(&state, &user, id).await?;
    let name = validate_name(&request.name)?;
    groups::rename(&state.db, id, &name, time::now()).await?;
    info!(group_id = id, name = %name, "Group renamed");

    let group = load_group(&state, id).await?;
    Ok(Json(group_view(&state, &group).await?))
}

/// DELETE /api/v1/groups/:id
pub async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "group", request_type = "DELETE", id, "Request received");

    load_as_owner(&state, &user, id).await?;
    groups::soft_delete(&state.db, id, time::now()).await?;
    info!(group_id = id, "Group deleted");

    Ok(Json(DeleteResponse::new(id)))
}

/// GET /api/v1/groups/:id/members
pub async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let group = load_as_member(&state, &user, id).await?;
    let group_ref = GroupRef::new(group.group_id, group.name);
    let members = groups::members(&state.db, id).await?;
    Ok(Json(members.iter().map(|m| member_view(&group_ref, m)).collect()))
}

async fn insert_member(
    state: &AppState,
    group: &GroupRecord,
    user_id: i64,
    permissions: MemberPermissions,
) -> ApiResult<MemberView> {
    ensure_user_exists(state, user_id).await?;
    if groups::member(&state.db, group.group_id, user_id).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "User {} is already a member of group {}",
            user_id, group.group_id
        )));
    }

    groups::add_member(&state.db, group.group_id, user_id, permissions).await?;
    info!(group_id = group.group_id, user_id, "Member added");

    let member = groups::member(&state.db, group.group_id, user_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Member {} vanished", user_id)))?;
    Ok(member_view(&GroupRef::new(group.group_id, group.name.clone()), &member))
}

/// POST /api/v1/groups/:id/members with default permissions
pub async fn add_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<IdRequest>,
) -> ApiResult<Json<MemberView>> {
    debug!(resource = "group_member", request_type = "POST", id, "Request received");

    let group = load_as_admin(&state, &user, id).await?;
    Ok(Json(insert_member(&state, &group, request.id, DEFAULT_MEMBER).await?))
}

/// POST /api/v1/groups/:id/members/:user_id with explicit permissions
pub async fn add_member_with_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(request): Json<PermissionsRequest>,
) -> ApiResult<Json<MemberView>> {
    debug!(resource = "group_member", request_type = "POST", id, user_id, "Request received");

    let group = load_as_admin(&state, &user, id).await?;
    let permissions = request.apply(DEFAULT_MEMBER);
    Ok(Json(insert_member(&state, &group, user_id, permissions).await?))
}

async fn load_member(state: &AppState, group_id: i64, user_id: i64) -> ApiResult<MemberRecord> {
    groups::member(&state.db, group_id, user_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "User {} is not a member of group {}",
                user_id, group_id
            ))
        })
}

/// GET /api/v1/groups/:id/members/:user_id
pub async fn get_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<MemberView>> {
    let group = load_as_member(&state, &user, id).await?;
    let member = load_member(&state, id, user_id).await?;
    Ok(Json(member_view(&GroupRef::new(group.group_id, group.name), &member)))
}

/// PUT /api/v1/groups/:id/members/:user_id
pub async fn modify_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(request): Json<PermissionsRequest>,
) -> ApiResult<Json<MemberView>> {
    debug!(resource = "group_member", request_type = "PUT", id, user_id, "Request received");

    let group = load_as_admin(&state, &user, id).await?;
    let member = load_member(&state, id, user_id).await?;

    let permissions = request.apply(member.permissions);
    groups::update_member(&state.db, id, user_id, permissions).await?;
    info!(group_id = id, user_id, ?permissions, "Member permissions changed");

    let member = load_member(&state, id, user_id).await?;
    Ok(Json(member_view(&GroupRef::new(group.group_id, group.name), &member)))
}

/// DELETE /api/v1/groups/:id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "group_member", request_type = "DELETE", id, user_id, "Request received");

    load_as_admin(&state, &user, id).await?;
    load_member(&state, id, user_id).await?;
    if groups::manager(&state.db, id, user_id).await?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "User {} is a manager of group {}; remove the manager role first",
            user_id, id
        )));
    }

    groups::remove_member(&state.db, id, user_id).await?;
    info!(group_id = id, user_id, "Member removed");

    Ok(Json(DeleteResponse::new(user_id)))
}

/// GET /api/v1/groups/:id/managers
pub async fn list_managers(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ManagerView>>> {
    let group = load_as_member(&state, &user, id).await?;
    let group_ref = GroupRef::new(group.group_id, group.name);
    let managers = groups::managers(&state.db, id).await?;
    Ok(Json(managers.iter().map(|m| manager_view(&group_ref, m)).collect()))
}

async fn insert_manager(
    state: &AppState,
    group: &GroupRecord,
    user_id: i64,
    role: ManagerRole,
) -> ApiResult<ManagerView> {
    ensure_user_exists(state, user_id).await?;
    if groups::manager(&state.db, group.group_id, user_id).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "User {} is already a manager of group {}",
            user_id, group.group_id
        )));
    }

    groups::add_manager(&state.db, group.group_id, user_id, role).await?;
    info!(group_id = group.group_id, user_id, ?role, "Manager added");

    let manager = load_manager(state, group.group_id, user_id).await?;
    Ok(manager_view(&GroupRef::new(group.group_id, group.name.clone()), &manager))
}

async fn load_manager(state: &AppState, group_id: i64, user_id: i64) -> ApiResult<ManagerRecord> {
    groups::manager(&state.db, group_id, user_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "User {} is not a manager of group {}",
                user_id, group_id
            ))
        })
}

/// POST /api/v1/groups/:id/managers with the default role
pub async fn add_manager(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<IdRequest>,
) -> ApiResult<Json<ManagerView>> {
    debug!(resource = "group_manager", request_type = "POST", id, "Request received");

    let group = load_as_owner(&state, &user, id).await?;
    Ok(Json(insert_manager(&state, &group, request.id, DEFAULT_MANAGER).await?))
}

/// POST /api/v1/groups/:id/managers/:user_id with an explicit role
pub async fn add_manager_with_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Json<ManagerView>> {
    debug!(resource = "group_manager", request_type = "POST", id, user_id, "Request received");

    let group = load_as_owner(&state, &user, id).await?;
    let role = request.apply(DEFAULT_MANAGER);
    Ok(Json(insert_manager(&state, &group, user_id, role).await?))
}

/// GET /api/v1/groups/:id/managers/:user_id
pub async fn get_manager(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ManagerView>> {
    let group = load_as_member(&state, &user, id).await?;
    let manager = load_manager(&state, id, user_id).await?;
    Ok(Json(manager_view(&GroupRef::new(group.group_id, group.name), &manager)))
}

/// PUT /api/v1/groups/:id/managers/:user_id
pub async fn modify_manager(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Json<ManagerView>> {
    debug!(resource = "group_manager", request_type = "PUT", id, user_id, "Request received");

    let group = load_as_owner(&state, &user, id).await?;
    let manager = load_manager(&state, id, user_id).await?;

    let role = request.apply(manager.role);
    if !groups::update_manager(&state.db, id, user_id, role).await? {
        return Err(last_owner_error(id, user_id));
    }
    info!(group_id = id, user_id, ?role, "Manager role changed");

    let manager = load_manager(&state, id, user_id).await?;
    Ok(Json(manager_view(&GroupRef::new(group.group_id, group.name), &manager)))
}

/// DELETE /api/v1/groups/:id/managers/:user_id
pub async fn remove_manager(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<DeleteResponse>> {
    debug!(resource = "group_manager", request_type = "DELETE", id, user_id, "Request received");

    load_as_owner(&state, &user, id).await?;
    load_manager(&state, id, user_id).await?;
    if !groups::remove_manager(&state.db, id, user_id).await? {
        return Err(last_owner_error(id, user_id));
    }
    info!(group_id = id, user_id, "Manager removed");

    Ok(Json(DeleteResponse::new(user_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_request_merges() {
        let request: PermissionsRequest = serde_json::from_str(r#"{"write": true}"#).unwrap();
        let merged = request.apply(DEFAULT_MEMBER);
        assert!(merged.read);
        assert!(merged.write);
        assert!(!merged.share_read);

        let request: PermissionsRequest =
            serde_json::from_str(r#"{"read": false, "shareWrite": true}"#).unwrap();
        let merged = request.apply(MemberPermissions::FULL);
        assert!(!merged.read);
        assert!(merged.write);
        assert!(merged.share_write);
    }

    #[test]
    fn test_role_request_defaults() {
        let request = RoleRequest::default();
        assert_eq!(request.apply(DEFAULT_MANAGER), DEFAULT_MANAGER);

        let request: RoleRequest = serde_json::from_str(r#"{"owner": true}"#).unwrap();
        let role = request.apply(DEFAULT_MANAGER);
        assert!(role.owner && role.admin);
    }
}
