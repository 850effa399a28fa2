//! Bootstrap configuration loading and root folder resolution
//!
//! Two tiers of configuration:
//! 1. **TOML bootstrap**: root folder, database path, listen address, logging.
//!    Read once at startup; a restart is needed to pick up changes.
//! 2. **Database runtime**: values kept in the `settings` table (e.g. the
//!    session signing secret, see [`crate::api::auth::load_secret_key`]).
//!
//! Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `DIOPTRA_ROOT_FOLDER` environment variable
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "DIOPTRA_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "dioptra.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and service data
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit path to the SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port (module default when absent)
    #[serde(default)]
    pub port: Option<u16>,

    /// Session signing secret. When absent, a secret is generated and
    /// persisted in the `settings` table.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Lifetime of issued session tokens
    #[serde(default = "default_session_lifetime_minutes")]
    pub session_lifetime_minutes: i64,

    /// PBKDF2 iteration count for newly hashed passwords
    #[serde(default = "default_password_hash_iterations")]
    pub password_hash_iterations: u32,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            bind_address: default_bind_address(),
            port: None,
            secret_key: None,
            session_lifetime_minutes: default_session_lifetime_minutes(),
            password_hash_iterations: default_password_hash_iterations(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_session_lifetime_minutes() -> i64 {
    30
}

fn default_password_hash_iterations() -> u32 {
    260_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default TOML location for a module: `<config dir>/dioptra/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dioptra").join(format!("{}.toml", module_name)))
}

/// Load a TOML bootstrap file
///
/// An explicitly requested file must exist. When no file is given, the
/// module's default location is tried and a missing file falls back to
/// defaults with a warning: a missing config never prevents startup.
pub fn load_toml<T>(explicit: Option<&Path>, module_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path(module_name) {
            Some(path) if path.exists() => path,
            _ => {
                warn!(
                    "No config file found for {}, using built-in defaults",
                    module_name
                );
                return Ok(T::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_value: Option<PathBuf>) -> Self {
        Self {
            cli_arg,
            toml_value,
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("dioptra"))
        .unwrap_or_else(|| PathBuf::from("./dioptra_data"))
}

/// Database path: explicit TOML value, otherwise `<root>/dioptra.db`
pub fn database_path(root_folder: &Path, config: &TomlConfig) -> PathBuf {
    config
        .database_path
        .clone()
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.session_lifetime_minutes, 30);
        assert_eq!(config.password_hash_iterations, 260_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.secret_key.is_none());
    }

    #[test]
    fn test_toml_overrides() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 5000
            secret_key = "abc"
            session_lifetime_minutes = 5

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, Some(5000));
        assert_eq!(config.secret_key.as_deref(), Some("abc"));
        assert_eq!(config.session_lifetime_minutes, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_database_path_defaults_into_root() {
        let config = TomlConfig::default();
        let path = database_path(Path::new("/srv/dioptra"), &config);
        assert_eq!(path, PathBuf::from("/srv/dioptra/dioptra.db"));
    }
}
