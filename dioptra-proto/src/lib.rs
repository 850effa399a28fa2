//! dioptra-proto library - the authentication prototype
//!
//! A handful of routes behind RS256 access tokens, plus optional `/restx`
//! routes exercising request validation and CSRF-protected forms.

use std::sync::Arc;

use axum::Router;
use rand::RngCore;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api;
pub mod config;
pub mod error;
pub mod restx;
pub mod tokens;
pub mod users;

pub use config::ProtoConfig;
pub use error::{ProtoError, ProtoResult};

use tokens::TokenKeys;
use users::UserStore;

/// Runtime switches taken from [`ProtoConfig`]
#[derive(Debug, Clone)]
pub struct ProtoSettings {
    pub secret_key: String,
    pub enable_restx: bool,
    /// Expected `csrf_token` form value; `None` disables the check
    pub csrf_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub tokens: TokenKeys,
    pub settings: Arc<ProtoSettings>,
}

impl AppState {
    pub fn new(config: &ProtoConfig, users: UserStore, tokens: TokenKeys) -> Self {
        let csrf_token = (!config.disable_csrf).then(|| {
            let mut bytes = [0u8; 20];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        });

        Self {
            users: Arc::new(users),
            tokens,
            settings: Arc::new(ProtoSettings {
                secret_key: config.secret_key.clone(),
                enable_restx: config.enable_restx,
                csrf_token,
            }),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = api::routes();
    if state.settings.enable_restx {
        tracing::info!("Registering /restx routes");
        router = router.nest("/restx", restx::routes());
    }

    router
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}
