//! Schema-validated routes mounted under `/restx`
//!
//! `/hello` checks JSON payloads against a fixed schema and `/form` accepts
//! a url-encoded form guarded by a CSRF token.

use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ProtoError, ProtoResult};
use crate::AppState;

const DEFAULT_HELLO: &str = "world";
#[allow(clippy::approx_constant)]
const DEFAULT_B: f64 = 3.14;

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub hello: String,
    pub foo: i64,
}

/// Body of `POST /restx/hello`
///
/// Fields may be omitted but not `null`; strings holding a boolean or a
/// number are accepted.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelloRequest {
    #[serde(rename = "A", default, deserialize_with = "lenient_bool")]
    pub a: Option<bool>,
    #[serde(rename = "B", default = "default_b", deserialize_with = "lenient_float")]
    pub b: f64,
}

fn default_b() -> f64 {
    DEFAULT_B
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "on" | "y" | "yes" | "1" => Some(true),
            "f" | "false" | "off" | "n" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| D::Error::custom("Not a valid boolean."))
}

fn lenient_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|b| b.is_finite())
        .ok_or_else(|| D::Error::custom("Not a valid number."))
}

/// Fields of `/form`; values stay raw until validated
#[derive(Debug, Deserialize)]
pub struct FormInput {
    pub name: Option<String>,
    pub age: Option<String>,
    pub csrf_token: Option<String>,
}

/// A form that passed validation
#[derive(Debug, PartialEq, Eq)]
pub struct ValidForm {
    pub name: Option<String>,
    pub age: Option<i64>,
}

impl FormInput {
    pub fn validate(self, expected_csrf: Option<&str>) -> ProtoResult<ValidForm> {
        if let Some(expected) = expected_csrf {
            if self.csrf_token.as_deref() != Some(expected) {
                return Err(ProtoError::BadRequest(
                    "The CSRF token is missing or invalid".to_string(),
                ));
            }
        }

        let age = self
            .age
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ProtoError::BadRequest("Not a valid integer value".to_string()))
            })
            .transpose()?;

        Ok(ValidForm {
            name: self.name,
            age,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub csrf_token: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hello", get(get_hello).post(post_hello))
        .route("/form", post(submit_form))
        .route("/csrf", get(csrf_token))
}

/// GET /restx/hello
pub async fn get_hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        hello: DEFAULT_HELLO.to_string(),
        foo: 1,
    })
}

/// POST /restx/hello
pub async fn post_hello(
    payload: Result<Json<HelloRequest>, JsonRejection>,
) -> ProtoResult<Json<&'static str>> {
    let Json(request) = payload.map_err(|e| ProtoError::BadRequest(e.body_text()))?;
    info!(a = ?request.a, b = request.b, "Validated hello payload");
    Ok(Json(""))
}

/// GET /restx/csrf
pub async fn csrf_token(State(state): State<AppState>) -> Json<CsrfResponse> {
    Json(CsrfResponse {
        csrf_token: state.settings.csrf_token.clone(),
    })
}

/// POST /restx/form
pub async fn submit_form(
    State(state): State<AppState>,
    form: Result<Form<FormInput>, FormRejection>,
) -> ProtoResult<Json<&'static str>> {
    let Form(input) = form.map_err(|e| ProtoError::BadRequest(e.body_text()))?;
    let valid = input.validate(state.settings.csrf_token.as_deref())?;
    debug!(name = ?valid.name, age = ?valid.age, "Form accepted");
    Ok(Json(""))
}
