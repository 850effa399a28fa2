//! Dioptra REST API - Main entry point
//!
//! Serves the v1 REST API backed by a SQLite database in the root folder.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use dioptra_common::api::load_secret_key;
use dioptra_common::config::{self, LoggingConfig, RootFolderResolver, TomlConfig};
use dioptra_common::db::init_database;
use dioptra_restapi::db::users;
use dioptra_restapi::{build_router, AppState, ServiceSettings};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "dioptra-restapi";
const DEFAULT_PORT: u16 = 5000;

/// Command-line arguments for dioptra-restapi
#[derive(Parser, Debug)]
#[command(name = "dioptra-restapi")]
#[command(about = "Dioptra v1 REST API service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "DIOPTRA_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "DIOPTRA_CONFIG")]
    config: Option<PathBuf>,
}

/// Subscriber filtered by RUST_LOG, else the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dioptra_restapi={level},dioptra_common={level},tower_http={level}",
            level = logging.level
        ))
    });

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config: TomlConfig = config::load_toml(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load configuration")?;
    init_tracing(&toml_config.logging)?;

    info!(
        "Starting {} v{} [{}] ({})",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("DIOPTRA_GIT_COMMIT"),
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );

    let root_folder =
        RootFolderResolver::new(args.root_folder.clone(), toml_config.root_folder.clone())
            .resolve();
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder, &toml_config);
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let secret = load_secret_key(&pool, toml_config.secret_key.as_deref())
        .await
        .context("Failed to load session secret")?;

    let purged = users::purge_expired_revocations(&pool, dioptra_common::time::now())
        .await
        .context("Failed to purge expired token revocations")?;
    if purged > 0 {
        info!("Purged {} expired token revocations", purged);
    }

    let state = AppState::new(pool, &secret, ServiceSettings::from_config(&toml_config));
    let app = build_router(state);

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let ip = toml_config
        .bind_address
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid bind address {}", toml_config.bind_address))?;
    let addr = SocketAddr::new(ip, port);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
