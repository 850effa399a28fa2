//! Shared helpers for the dioptra-restapi integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use dioptra_restapi::{build_router, AppState, ServiceSettings};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery staple";

/// Router over a throw-away database
pub struct TestApp {
    pub app: Router,
    pub db: SqlitePool,
    _dir: TempDir,
}

/// Status, headers and decoded body of one response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = dioptra_common::db::init_database(&dir.path().join("dioptra.db"))
            .await
            .unwrap();

        let settings = ServiceSettings {
            session_lifetime: chrono::Duration::minutes(30),
            password_hash_iterations: 1_000,
        };
        let state = AppState::new(db.clone(), "test-secret", settings);

        Self {
            app: build_router(state),
            db,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// JSON request, authenticated with `cookie` when given
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.call(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.call(Method::POST, uri, Some(cookie), Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.call(Method::PUT, uri, Some(cookie), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> TestResponse {
        self.call(Method::DELETE, uri, Some(cookie), None).await
    }

    pub async fn register(&self, username: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.org", username),
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
            })),
        )
        .await
    }

    pub async fn login_with(&self, username: &str, password: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Log in and return the `session=<token>` cookie pair
    pub async fn login(&self, username: &str) -> String {
        let response = self.login_with(username, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        session_cookie(&response)
    }

    /// Register, log in and return the session cookie
    pub async fn user(&self, username: &str) -> String {
        let response = self.register(username).await;
        assert_eq!(response.status, StatusCode::OK, "register failed: {}", response.body);
        self.login(username).await
    }

    /// Create a group and return its id
    pub async fn group(&self, cookie: &str, name: &str) -> i64 {
        let response = self.post("/api/v1/groups", cookie, json!({ "name": name })).await;
        assert_eq!(response.status, StatusCode::OK, "create group failed: {}", response.body);
        id_of(&response)
    }

    /// Create a named resource under `collection` and return its id
    pub async fn named(&self, cookie: &str, collection: &str, group: i64, name: &str) -> i64 {
        let response = self
            .post(
                collection,
                cookie,
                json!({ "group": group, "name": name, "description": "" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "create failed: {}", response.body);
        id_of(&response)
    }
}

pub fn id_of(response: &TestResponse) -> i64 {
    response.body["id"].as_i64().unwrap()
}

pub fn session_cookie(response: &TestResponse) -> String {
    let set_cookie = response
        .headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}
