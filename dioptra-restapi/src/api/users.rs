//! User registration and account management

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use dioptra_common::time;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::auth::{check_password, hash_new_password, CurrentUser};
use super::views::GroupRef;
use crate::db::{groups, users, users::UserRecord};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::{AppState, API_V1};

/// Longest accepted username
pub const MAX_USERNAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub username: String,
    /// Only shown to the user themselves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_on: DateTime<Utc>,
    pub last_modified_on: DateTime<Utc>,
    pub last_login_on: Option<DateTime<Utc>>,
    pub groups: Vec<GroupRef>,
}

async fn user_view(state: &AppState, user: &UserRecord, viewer_id: i64) -> ApiResult<UserView> {
    let memberships = groups::memberships_of(&state.db, user.user_id).await?;

    Ok(UserView {
        id: user.user_id,
        username: user.username.clone(),
        email: (user.user_id == viewer_id).then(|| user.email.clone()),
        created_on: user.created_on,
        last_modified_on: user.last_modified_on,
        last_login_on: user.last_login_on,
        groups: memberships
            .into_iter()
            .map(|(id, name)| GroupRef::new(id, name))
            .collect(),
    })
}

fn validate_username(username: &str) -> ApiResult<String> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    Ok(username.to_string())
}

fn validate_email(email: &str) -> ApiResult<String> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::BadRequest(format!("{} is not a valid email address", email)));
    }
    Ok(email.to_string())
}

fn validate_new_password(password: &str, confirmation: &str) -> ApiResult<()> {
    if password.is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".to_string()));
    }
    if password != confirmation {
        return Err(ApiError::BadRequest(
            "password and confirmation do not match".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_username_free(state: &AppState, username: &str, exclude: Option<i64>) -> ApiResult<()> {
    if users::username_taken(&state.db, username, exclude).await? {
        return Err(ApiError::Conflict(format!("Username {} is taken", username)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// POST /api/v1/users
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<UserView>> {
    debug!(resource = "user", request_type = "POST", "Registration request received");

    let username = validate_username(&request.username)?;
    let email = validate_email(&request.email)?;
    validate_new_password(&request.password, &request.confirm_password)?;
    ensure_username_free(&state, &username, None).await?;

    let hash = hash_new_password(request.password, state.settings.password_hash_iterations).await?;
    let user_id = users::register(&state.db, &username, &email, &hash, time::now()).await?;
    info!(user_id, username = %username, "User registered");

    let user = users::get_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("User {} vanished after registration", user_id)))?;
    Ok(Json(user_view(&state, &user, user_id).await?))
}

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<UserView>>> {
    debug!(resource = "user", request_type = "GET", "Request received");

    let paging = query.paging().map_err(ApiError::BadRequest)?;
    let (records, total) =
        users::list(&state.db, query.search_term(), paging.index, paging.page_length).await?;

    let mut views = Vec::with_capacity(records.len());
    for record in &records {
        views.push(user_view(&state, record, current.id()).await?);
    }

    let route = format!("{}/users", API_V1);
    Ok(Json(Page::new(&route, &query, paging, views, total)))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserView>> {
    let user = users::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    Ok(Json(user_view(&state, &user, current.id()).await?))
}

/// GET /api/v1/users/current
pub async fn get_current_user(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<UserView>> {
    Ok(Json(user_view(&state, &current.user, current.id()).await?))
}

#[derive(Debug, Deserialize)]
pub struct ModifyUserRequest {
    pub username: String,
    pub email: String,
}

/// PUT /api/v1/users/current
pub async fn modify_current_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ModifyUserRequest>,
) -> ApiResult<Json<UserView>> {
    debug!(resource = "user", request_type = "PUT", user_id = current.id(), "Request received");

    let username = validate_username(&request.username)?;
    let email = validate_email(&request.email)?;
    ensure_username_free(&state, &username, Some(current.id())).await?;

    users::update_profile(&state.db, current.id(), &username, &email, time::now()).await?;
    info!(user_id = current.id(), "User profile updated");

    let user = users::get_by_id(&state.db, current.id())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", current.id())))?;
    Ok(Json(user_view(&state, &user, current.id()).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub password: String,
}

/// DELETE /api/v1/users/current
pub async fn delete_current_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<DeleteUserRequest>,
) -> ApiResult<Json<Value>> {
    debug!(resource = "user", request_type = "DELETE", user_id = current.id(), "Request received");

    if !check_password(current.user.password_hash.clone(), request.password).await? {
        warn!(user_id = current.id(), "Account deletion refused: wrong password");
        return Err(ApiError::Forbidden("Password is incorrect".to_string()));
    }

    users::soft_delete(&state.db, current.id(), time::now()).await?;
    info!(user_id = current.id(), username = %current.user.username, "User deleted");

    Ok(Json(json!({"status": "Success", "username": [current.user.username]})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// POST /api/v1/users/current/password
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    debug!(resource = "user", request_type = "POST", user_id = current.id(), "Password change received");

    if !check_password(current.user.password_hash.clone(), request.old_password).await? {
        warn!(user_id = current.id(), "Password change refused: wrong password");
        return Err(ApiError::Forbidden("Password is incorrect".to_string()));
    }
    validate_new_password(&request.new_password, &request.confirm_new_password)?;

    let hash =
        hash_new_password(request.new_password, state.settings.password_hash_iterations).await?;
    users::set_password(&state.db, current.id(), &hash, time::now()).await?;
    info!(user_id = current.id(), "Password changed");

    Ok(Json(json!({"status": "Success", "username": [current.user.username]})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert_eq!(validate_email(" a@b.org ").unwrap(), "a@b.org");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@b.org").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a b@c.org").is_err());
        assert!(validate_email("a@b@c").is_err());
    }

    #[test]
    fn test_username_validation() {
        assert_eq!(validate_username(" alice ").unwrap(), "alice");
        assert!(validate_username("").is_err());
        assert!(validate_username(&"u".repeat(MAX_USERNAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_password_confirmation() {
        assert!(validate_new_password("secret", "secret").is_ok());
        assert!(validate_new_password("secret", "Secret").is_err());
        assert!(validate_new_password("", "").is_err());
    }
}
