//! Shared authentication building blocks
//!
//! Provides password hashing, signed session tokens and the session
//! signing secret used by the Dioptra services.
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Database operations (via sqlx)
//! - Shared types
//!
//! Each service wraps these with its own axum middleware.

pub mod auth;
pub mod password;

pub use auth::{load_secret_key, SessionClaims, SessionKeys};
pub use password::{hash_password, verify_password};
