//! HTTP API handlers for dioptra-restapi

pub mod artifacts;
pub mod auth;
pub mod experiments;
pub mod groups;
pub mod health;
pub mod jobs;
pub mod models;
pub mod parameter_types;
pub mod plugins;
pub mod queues;
pub mod resource;
pub mod tags;
pub mod task_plugins;
pub mod users;
pub mod views;

pub use auth::CurrentUser;
pub use health::health_routes;
