//! Tests for configuration loading and root folder resolution
//!
//! Uses serial_test: tests touching DIOPTRA_ROOT_FOLDER run sequentially.

use dioptra_common::config::{
    default_root_folder, load_toml, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_cli_has_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/dioptra-env");
    let resolver = RootFolderResolver::new(
        Some(PathBuf::from("/tmp/dioptra-cli")),
        Some(PathBuf::from("/tmp/dioptra-toml")),
    );
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/dioptra-cli"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_env_before_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/dioptra-env");
    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/dioptra-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/dioptra-env"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/dioptra-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/dioptra-toml"));

    let resolver = RootFolderResolver::new(None, None);
    assert_eq!(resolver.resolve(), default_root_folder());
}

#[test]
fn test_load_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("restapi.toml");
    std::fs::write(&path, "port = 5080\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config: TomlConfig = load_toml(Some(&path), "restapi").unwrap();
    assert_eq!(config.port, Some(5080));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");
    let result: dioptra_common::Result<TomlConfig> = load_toml(Some(&path), "restapi");
    assert!(result.is_err());
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let result: dioptra_common::Result<TomlConfig> = load_toml(Some(&path), "restapi");
    assert!(result.is_err());
}
