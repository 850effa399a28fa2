//! Dioptra authentication prototype - Main entry point

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use dioptra_common::config::{self, LoggingConfig};
use dioptra_proto::tokens::TokenKeys;
use dioptra_proto::users::UserStore;
use dioptra_proto::{build_router, AppState, ProtoConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "dioptra-proto";
const DEFAULT_PORT: u16 = 5000;

#[derive(Parser, Debug)]
#[command(name = "dioptra-proto")]
#[command(about = "Dioptra authentication prototype")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "DIOPTRA_PROTO_PORT")]
    port: Option<u16>,

    /// Directory holding jwt_key and jwt_key.pub
    #[arg(long, env = "DIOPTRA_PROTO_VAULT")]
    vault_dir: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "DIOPTRA_PROTO_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dioptra_proto={level},dioptra_common={level},tower_http={level}",
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

    let mut proto_config: ProtoConfig = config::load_toml(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load configuration")?;
    if let Some(vault_dir) = args.vault_dir {
        proto_config.vault_dir = vault_dir;
    }
    init_tracing(&proto_config.logging)?;

    info!(
        "Starting {} v{} [{}] ({})",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("DIOPTRA_GIT_COMMIT"),
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );

    let tokens = TokenKeys::load(
        &proto_config.private_key_path(),
        &proto_config.public_key_path(),
        chrono::Duration::minutes(proto_config.token_lifetime_minutes),
    )
    .context("Failed to load token keys")?;
    info!("Loaded token keys from {}", proto_config.vault_dir.display());

    let users = UserStore::seeded(proto_config.password_hash_iterations)
        .context("Failed to create user store")?;

    if proto_config.disable_csrf {
        info!("CSRF protection disabled");
    }

    let app = build_router(AppState::new(&proto_config, users, tokens));

    let port = args.port.or(proto_config.port).unwrap_or(DEFAULT_PORT);
    let ip = proto_config
        .bind_address
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid bind address {}", proto_config.bind_address))?;
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
