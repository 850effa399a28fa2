//! Database access for dioptra-restapi
//!
//! The schema itself is created by [`dioptra_common::db::init_database`];
//! these modules only read and write rows.

pub mod groups;
pub mod jobs;
pub mod models;
pub mod queues;
pub mod resources;
pub mod tags;
pub mod task_plugins;
pub mod users;
