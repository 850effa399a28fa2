//! Login, logout and the token-protected demo routes
//!
//! A login answers with the signed token and also stores it in the `session`
//! cookie, so later requests authenticate with either the `x-access-token`
//! header or the cookie. Logout expires the cookie.

use axum::{
    body::Bytes,
    extract::{FromRequestParts, State},
    http::{
        header::{self, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, Method,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ProtoError, ProtoResult};
use crate::users::{User, UserView};
use crate::AppState;

/// Header carrying the access token
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Cookie holding the login session
pub const SESSION_COOKIE: &str = "session";

/// User loaded from a valid `x-access-token` or session cookie
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ProtoError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers)
            .ok_or_else(|| ProtoError::Unauthorized("Login required".to_string()))?;

        let claims = state.tokens.verify(&token).map_err(|e| {
            debug!("Rejected access token: {}", e);
            ProtoError::Unauthorized("Invalid or expired token".to_string())
        })?;

        state
            .users
            .get(&claims.id)
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ProtoError::Unauthorized("Unknown user".to_string()))
    }
}

/// The `x-access-token` header, falling back to the session cookie
fn request_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    )
}

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

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/hello", get(hello).put(hello).post(hello))
        .route("/test", get(show_secret).put(show_secret).post(show_secret))
        .route("/world", get(world).put(world).post(world))
        .route("/foo", get(foo).put(foo).post(foo))
}

/// POST /auth/login
///
/// Responds with the signed token as a JSON string and sets the session cookie.
pub async fn login(State(state): State<AppState>, body: Bytes) -> ProtoResult<Response> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| ProtoError::BadRequest(format!("Invalid login payload: {}", e)))?;

    let Some(user) = state.users.authenticate(&request.username, &request.password) else {
        warn!(username = %request.username, "Login failed");
        return Err(ProtoError::LoginFailed);
    };

    let token = state.tokens.issue(user)?;
    info!(username = %user.name, "User logged in");

    let cookie = session_cookie(&token, state.tokens.lifetime().num_seconds());
    Ok(([(SET_COOKIE, cookie)], Json(token)).into_response())
}

/// POST /auth/logout
pub async fn logout() -> Response {
    (
        [(SET_COOKIE, session_cookie("", 0))],
        Json(json!({ "result": 200, "data": { "message": "logout success" } })),
    )
        .into_response()
}

pub async fn hello() -> &'static str {
    "Hello, World!"
}

/// Echoes the configured secret key
pub async fn show_secret(State(state): State<AppState>, _user: AuthUser) -> String {
    state.settings.secret_key.clone()
}

pub async fn world(AuthUser(user): AuthUser) -> Json<UserView> {
    Json(user.view())
}

/// POST echoes a JSON body back; other methods answer `bar`
pub async fn foo(
    method: Method,
    _user: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> ProtoResult<Response> {
    if method != Method::POST {
        return Ok("bar".into_response());
    }

    if !is_json(&headers) {
        return Err(ProtoError::BadRequest("unknown input".to_string()));
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| ProtoError::BadRequest(format!("Invalid JSON: {}", e)))?;
    Ok(Json(value).into_response())
}

/// Content type is exactly `application/json`, without parameters
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes() == b"application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(is_json(&headers));
    }

    #[test]
    fn test_header_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=from-cookie"));
        assert_eq!(request_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(request_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_cleared_cookie_is_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session="));
        assert!(request_token(&headers).is_none());
    }

    #[test]
    fn test_login_defaults() {
        let request: LoginRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.username, "guest");
        assert_eq!(request.password, "");
    }
}
