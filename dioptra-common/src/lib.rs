//! # Dioptra Common Library
//!
//! Shared code for the Dioptra services:
//! - Error types
//! - Bootstrap configuration loading and root folder resolution
//! - Database schema initialization
//! - Password hashing and signed session tokens
//! - Timestamp helpers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
