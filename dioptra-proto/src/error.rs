//! Error responses of the prototype service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ProtoError {
    /// Malformed or unexpected input (400)
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid access token (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown user or wrong password on login (401)
    #[error("Username or Password Error")]
    LoginFailed,

    #[error("Common error: {0}")]
    Common(#[from] dioptra_common::Error),
}

impl IntoResponse for ProtoError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ProtoError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "message": message }))
            }
            ProtoError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "message": message }))
            }
            ProtoError::LoginFailed => (
                StatusCode::UNAUTHORIZED,
                json!({ "status": 401, "reason": ProtoError::LoginFailed.to_string() }),
            ),
            ProtoError::Common(err) => {
                error!("{}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": err.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ProtoResult<T> = Result<T, ProtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(
            ProtoError::LoginFailed.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProtoError::BadRequest("unknown input".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProtoError::from(dioptra_common::Error::Config("vault".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
