//! rvw-admin - Reviewdesk marketplace administration service
//!
//! Startup order: arguments, config file, logging, root folder, database,
//! bootstrap admin, proof scorer, HTTP server.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use rvw_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use rvw_common::db::init_database;
use rvw_admin::db::{admins, sessions};
use rvw_admin::services::proof_scorer::HttpProofScorer;
use rvw_admin::{build_router, AppState, ServiceConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for rvw-admin
#[derive(Parser, Debug)]
#[command(name = "rvw-admin")]
#[command(about = "Reviewdesk marketplace administration service")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "RVW_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RVW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RVW_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long, env = "RVW_BIND")]
    bind: Option<String>,
}

/// Install the global subscriber: stdout, plus an append-only file when configured
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before logging exists, so load() warnings go nowhere; the
    // outcome is logged again below.
    let config = TomlConfig::load(args.config.as_deref());
    init_tracing(&config)?;

    info!("Starting Reviewdesk admin (rvw-admin) v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Config file: {}", path.display());
    }

    let resolver = RootFolderResolver::new("rvw-admin")
        .with_cli_arg(args.root_folder.clone())
        .with_config(&config);
    let (root_folder, source) = resolver.resolve_with_source();
    info!("Root folder: {} ({:?})", root_folder.display(), source);

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let purged = sessions::purge_expired(&db)
        .await
        .context("Failed to purge expired sessions")?;
    if purged > 0 {
        info!("Removed {} expired admin session(s)", purged);
    }

    admins::ensure_bootstrap_admin(&db, std::env::var("RVW_BOOTSTRAP_ADMIN_PASSWORD").ok())
        .await
        .context("Failed to create bootstrap admin")?;

    let service_config = ServiceConfig {
        session_ttl: chrono::Duration::minutes(config.session_ttl_minutes),
        secure_cookies: config.secure_cookies,
    };
    let mut state = AppState::new(db, service_config);

    match &config.proof_scorer {
        Some(scorer_config) => match HttpProofScorer::from_config(scorer_config) {
            Ok(scorer) => {
                info!("Proof scorer: {}", scorer_config.url);
                state = state.with_scorer(Arc::new(scorer));
            }
            Err(e) => warn!("Proof scorer disabled: {}", e),
        },
        None => info!("No proof scorer configured; auto-verify uses stored scores only"),
    }

    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("rvw-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

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
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
