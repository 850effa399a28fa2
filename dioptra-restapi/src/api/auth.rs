//! Login, logout and session authentication
//!
//! A session is a signed token carried in the `session` cookie (set at
//! login), an `Authorization: Bearer` header, or an `x-access-token` header,
//! checked in that order. [`CurrentUser`] is the extractor protected
//! handlers take; it rejects the request with 401 unless the token verifies,
//! has not been revoked, and still matches the user's alternative id.

use axum::{
    extract::{FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap,
    },
    response::{IntoResponse, Response},
    Json,
};
use dioptra_common::api::{hash_password, verify_password, SessionClaims};
use dioptra_common::time;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::db::users::{self, UserRecord};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Alternate header carrying a raw token
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// The authenticated user of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRecord,
    pub claims: SessionClaims,
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.user.user_id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))?;

        let claims = state.sessions.verify(&token).map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::Unauthorized("Invalid or expired session".to_string())
        })?;

        if users::is_token_revoked(&state.db, &claims.jti).await? {
            return Err(ApiError::Unauthorized("Session has been logged out".to_string()));
        }

        let user = users::get_by_id(&state.db, claims.sub)
            .await?
            .filter(|user| user.alternative_id == claims.alt)
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(CurrentUser { user, claims })
    }
}

/// Find the session token: cookie, then bearer header, then access token header
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    let from_bearer = || {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    };

    let from_access_header = || {
        headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    };

    from_cookie.or_else(from_bearer).or_else(from_access_header)
}

fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    )
}

/// Verify a password off the async runtime
pub(crate) async fn check_password(hash: String, password: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check failed: {}", e)))
}

/// Hash a password off the async runtime
pub(crate) async fn hash_new_password(password: String, iterations: u32) -> ApiResult<String> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))??;
    Ok(hash)
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default = "guest")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn guest() -> String {
    "guest".to_string()
}

fn login_error() -> ApiError {
    ApiError::Unauthorized("Invalid username or password".to_string())
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    debug!(resource = "auth", request_type = "POST", username = %request.username, "Login request received");

    let Some(user) = users::get_by_username(&state.db, &request.username).await? else {
        warn!(username = %request.username, "Login failed: unknown user");
        return Err(login_error());
    };

    if !check_password(user.password_hash.clone(), request.password).await? {
        warn!(username = %user.username, "Login failed: wrong password");
        return Err(login_error());
    }

    if users::is_locked(&state.db, user.user_id).await? {
        warn!(username = %user.username, "Login failed: account locked");
        return Err(login_error());
    }

    users::record_login(&state.db, user.user_id, time::now()).await?;

    let lifetime = state.settings.session_lifetime;
    let (token, _) = state
        .sessions
        .issue(user.user_id, &user.alternative_id, lifetime)?;

    info!(user_id = user.user_id, username = %user.username, "Login successful");

    Ok((
        [(SET_COOKIE, session_cookie(&token, lifetime.num_seconds()))],
        Json(json!({"status": 200, "message": "Login successful."})),
    )
        .into_response())
}

/// Logout request
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    /// Also end every other session of the user
    #[serde(default)]
    pub everywhere: bool,
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Option<Json<LogoutRequest>>,
) -> ApiResult<Response> {
    let everywhere = request.map(|Json(r)| r.everywhere).unwrap_or(false);
    debug!(resource = "auth", request_type = "POST", everywhere, "Logout request received");

    users::revoke_token(&state.db, &current.claims.jti, current.id(), current.claims.exp).await?;
    let purged = users::purge_expired_revocations(&state.db, time::now()).await?;
    if purged > 0 {
        debug!(purged, "Purged expired token revocations");
    }
    if everywhere {
        users::rotate_alternative_id(&state.db, current.id()).await?;
    }

    info!(user_id = current.id(), everywhere, "Logout successful");

    Ok((
        [(SET_COOKIE, session_cookie("", 0))],
        Json(json!({"status": 200, "message": "Logout successful."})),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc.def.ghi"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_cookie_preferred_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_then_access_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-bearer"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn test_cookie_format() {
        assert_eq!(
            session_cookie("tok", 1800),
            "session=tok; HttpOnly; Path=/; SameSite=Lax; Max-Age=1800"
        );
    }
}
