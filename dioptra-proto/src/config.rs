//! Bootstrap configuration for the prototype service
//!
//! Loaded with [`dioptra_common::config::load_toml`] from
//! `~/.config/dioptra/dioptra-proto.toml` unless a file is given.

use std::path::PathBuf;

use dioptra_common::config::LoggingConfig;
use serde::Deserialize;

/// Private key file name inside the vault
pub const PRIVATE_KEY_FILE: &str = "jwt_key";

/// Public key file name inside the vault
pub const PUBLIC_KEY_FILE: &str = "jwt_key.pub";

#[derive(Debug, Clone, Deserialize)]
pub struct ProtoConfig {
    /// Returned verbatim by `/test`
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    /// Mount the `/restx` routes
    #[serde(default)]
    pub enable_restx: bool,

    /// Skip the CSRF token check on `/restx/form`
    #[serde(default)]
    pub disable_csrf: bool,

    /// Directory holding `jwt_key` and `jwt_key.pub`
    #[serde(default = "default_vault_dir")]
    pub vault_dir: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_token_lifetime_minutes")]
    pub token_lifetime_minutes: i64,

    /// PBKDF2 iterations used when hashing the seeded passwords
    #[serde(default = "default_password_hash_iterations")]
    pub password_hash_iterations: u32,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ProtoConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            enable_restx: false,
            disable_csrf: false,
            vault_dir: default_vault_dir(),
            bind_address: default_bind_address(),
            port: None,
            token_lifetime_minutes: default_token_lifetime_minutes(),
            password_hash_iterations: default_password_hash_iterations(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProtoConfig {
    pub fn private_key_path(&self) -> PathBuf {
        self.vault_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.vault_dir.join(PUBLIC_KEY_FILE)
    }
}

fn default_secret_key() -> String {
    "dev".to_string()
}

fn default_vault_dir() -> PathBuf {
    PathBuf::from("vault")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_token_lifetime_minutes() -> i64 {
    30
}

fn default_password_hash_iterations() -> u32 {
    260_000
}
