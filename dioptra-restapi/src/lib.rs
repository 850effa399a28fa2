//! dioptra-restapi library - the Dioptra v1 REST API
//!
//! Users, groups and the group-owned, versioned resources (queues,
//! experiments, models, artifacts, plugins, jobs, tags) served as JSON over
//! HTTP, plus the legacy task plugin upload endpoints.

use std::sync::Arc;

use axum::Router;
use dioptra_common::api::SessionKeys;
use dioptra_common::config::TomlConfig;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Prefix of every v1 route
pub const API_V1: &str = "/api/v1";

/// Settings fixed at startup
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Lifetime of issued session tokens
    pub session_lifetime: chrono::Duration,
    /// PBKDF2 iterations for newly hashed passwords
    pub password_hash_iterations: u32,
}

impl ServiceSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            session_lifetime: chrono::Duration::minutes(config.session_lifetime_minutes),
            password_hash_iterations: config.password_hash_iterations,
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Session token signing keys
    pub sessions: SessionKeys,
    pub settings: Arc<ServiceSettings>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, secret_key: &str, settings: ServiceSettings) -> Self {
        Self {
            db,
            sessions: SessionKeys::new(secret_key),
            settings: Arc::new(settings),
        }
    }
}

/// Build application router
///
/// Handlers that need a session take an [`api::auth::CurrentUser`]
/// argument; the rest (health, login, registration) are public.
pub fn build_router(state: AppState) -> Router {
    use api::experiments::Experiments;
    use api::queues::Queues;
    use api::resource as generic;
    use api::{
        artifacts, auth, groups, jobs, models, parameter_types, plugins, queues, tags,
        task_plugins, users,
    };
    use axum::routing::{get, post};

    let v1 = Router::new()
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users", get(users::list_users).post(users::register_user))
        .route(
            "/users/current",
            get(users::get_current_user)
                .put(users::modify_current_user)
                .delete(users::delete_current_user),
        )
        .route("/users/current/password", post(users::change_password))
        .route("/users/:id", get(users::get_user))
        // Groups
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/:id",
            get(groups::get_group)
                .put(groups::modify_group)
                .delete(groups::delete_group),
        )
        .route(
            "/groups/:id/members",
            get(groups::list_members).post(groups::add_member),
        )
        .route(
            "/groups/:id/members/:user_id",
            get(groups::get_member)
                .post(groups::add_member_with_permissions)
                .put(groups::modify_member)
                .delete(groups::remove_member),
        )
        .route(
            "/groups/:id/managers",
            get(groups::list_managers).post(groups::add_manager),
        )
        .route(
            "/groups/:id/managers/:user_id",
            get(groups::get_manager)
                .post(groups::add_manager_with_role)
                .put(groups::modify_manager)
                .delete(groups::remove_manager),
        )
        // Queues
        .route(
            "/queues",
            get(generic::list_resources::<Queues>).post(generic::create_named::<Queues>),
        )
        .route(
            "/queues/:id",
            get(generic::get_resource::<Queues>)
                .put(generic::modify_named::<Queues>)
                .delete(generic::delete_resource::<Queues>),
        )
        .route(
            "/queues/:id/lock",
            get(queues::get_lock)
                .put(queues::lock_queue)
                .delete(queues::unlock_queue),
        )
        .merge(generic::snapshot_routes::<Queues>("/queues"))
        .merge(generic::tag_routes::<Queues>("/queues"))
        // Experiments
        .route(
            "/experiments",
            get(generic::list_resources::<Experiments>)
                .post(generic::create_named::<Experiments>),
        )
        .route(
            "/experiments/:id",
            get(generic::get_resource::<Experiments>)
                .put(generic::modify_named::<Experiments>)
                .delete(generic::delete_resource::<Experiments>),
        )
        .merge(generic::snapshot_routes::<Experiments>("/experiments"))
        .merge(generic::tag_routes::<Experiments>("/experiments"))
        // Models and their registered versions
        .route("/models", get(models::list_models).post(models::create_model))
        .route(
            "/models/:id",
            get(models::get_model)
                .put(models::modify_model)
                .delete(generic::delete_resource::<models::Models>),
        )
        .route(
            "/models/:id/versions",
            get(models::list_versions).post(models::create_version),
        )
        .route(
            "/models/:id/versions/:version_number",
            get(models::get_version).put(models::modify_version),
        )
        .merge(generic::tag_routes::<models::Models>("/models"))
        // Artifacts
        .route(
            "/artifacts",
            get(generic::list_resources::<artifacts::Artifacts>).post(artifacts::create_artifact),
        )
        .route(
            "/artifacts/:id",
            get(generic::get_resource::<artifacts::Artifacts>)
                .put(artifacts::modify_artifact)
                .delete(generic::delete_resource::<artifacts::Artifacts>),
        )
        .merge(generic::snapshot_routes::<artifacts::Artifacts>("/artifacts"))
        .merge(generic::tag_routes::<artifacts::Artifacts>("/artifacts"))
        // Plugin parameter types
        .route(
            "/pluginParameterTypes",
            get(generic::list_resources::<parameter_types::ParameterTypes>)
                .post(parameter_types::create_parameter_type),
        )
        .route(
            "/pluginParameterTypes/:id",
            get(generic::get_resource::<parameter_types::ParameterTypes>)
                .put(parameter_types::modify_parameter_type)
                .delete(parameter_types::delete_parameter_type),
        )
        .merge(generic::snapshot_routes::<parameter_types::ParameterTypes>(
            "/pluginParameterTypes",
        ))
        .merge(generic::tag_routes::<parameter_types::ParameterTypes>(
            "/pluginParameterTypes",
        ))
        // Plugins and plugin files
        .route("/plugins", get(plugins::list_plugins).post(plugins::create_plugin))
        .route(
            "/plugins/:id",
            get(plugins::get_plugin)
                .put(plugins::modify_plugin)
                .delete(generic::delete_resource::<plugins::Plugins>),
        )
        .merge(generic::snapshot_routes::<plugins::Plugins>("/plugins"))
        .merge(generic::tag_routes::<plugins::Plugins>("/plugins"))
        .route(
            "/plugins/:id/files",
            get(plugins::list_files).post(plugins::create_file),
        )
        .route(
            "/plugins/:id/files/:file_id",
            get(plugins::get_file)
                .put(plugins::modify_file)
                .delete(plugins::delete_file),
        )
        .route(
            "/plugins/:id/files/:file_id/snapshots",
            get(plugins::list_file_snapshots),
        )
        .route(
            "/plugins/:id/files/:file_id/snapshots/:snapshot_id",
            get(plugins::get_file_snapshot),
        )
        // Jobs
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/jobs/:id",
            get(jobs::get_job).delete(generic::delete_resource::<jobs::Jobs>),
        )
        .route(
            "/jobs/:id/status",
            get(jobs::get_status).put(jobs::set_status),
        )
        .merge(generic::tag_routes::<jobs::Jobs>("/jobs"))
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/:id",
            get(tags::get_tag).put(tags::modify_tag).delete(tags::delete_tag),
        )
        .route("/tags/:id/resources", get(tags::tagged_resources));

    let legacy = Router::new()
        .route(
            "/taskPlugin",
            get(task_plugins::list_all).post(task_plugins::upload),
        )
        .route(
            "/taskPlugin/dioptra_builtins",
            get(task_plugins::list_builtins),
        )
        .route("/taskPlugin/dioptra_custom", get(task_plugins::list_custom))
        .route(
            "/taskPlugin/dioptra_builtins/:name",
            get(task_plugins::get_builtin),
        )
        .route(
            "/taskPlugin/dioptra_custom/:name",
            get(task_plugins::get_custom).delete(task_plugins::delete_custom),
        );

    Router::new()
        .nest(API_V1, v1)
        .nest("/api", legacy)
        .merge(api::health_routes())
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
