//! Tests for database initialization
//!
//! - Database file created on first run
//! - Initialization is idempotent on an existing database
//! - Lookup tables are seeded
//! - Session secret is generated once and then reused

use dioptra_common::api::auth::load_secret_key;
use dioptra_common::db::init::{init_database, RESOURCE_TYPES, USER_LOCK_TYPES};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("dioptra.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dioptra.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn test_lookup_tables_seeded() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("dioptra.db")).await.unwrap();

    let resource_types: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource_types")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(resource_types, RESOURCE_TYPES.len() as i64);

    let lock_types: Vec<String> =
        sqlx::query_scalar("SELECT user_lock_type FROM user_lock_types ORDER BY user_lock_type")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(lock_types.len(), USER_LOCK_TYPES.len());
    assert!(lock_types.contains(&"delete".to_string()));
}

#[tokio::test]
async fn test_live_usernames_unique() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("dioptra.db")).await.unwrap();

    let insert = "INSERT INTO users (username, email, password_hash, alternative_id, created_on, last_modified_on, is_deleted) VALUES (?, 'a@b.c', '', 'x', '', '', ?)";

    sqlx::query(insert).bind("alice").bind(1).execute(&pool).await.unwrap();
    sqlx::query(insert).bind("alice").bind(0).execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).bind("alice").bind(0).execute(&pool).await;
    assert!(duplicate.is_err(), "Second live user with same name should be rejected");
}

#[tokio::test]
async fn test_secret_key_generated_once() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("dioptra.db")).await.unwrap();

    let first = load_secret_key(&pool, None).await.unwrap();
    let second = load_secret_key(&pool, None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);

    let configured = load_secret_key(&pool, Some("configured")).await.unwrap();
    assert_eq!(configured, "configured");
}
