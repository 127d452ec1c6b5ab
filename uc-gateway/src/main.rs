//! Under Construction Gateway
//!
//! Sits in front of a website and serves a maintenance notice to visitors while
//! the gate is enabled. Administrators, logged-in users (depending on the access
//! mode) and whitelisted addresses are proxied through to the real site.
//!
//! # Features
//!
//! - Role, login and IP based bypass of the notice
//! - Settings form with session login and CSRF protection
//! - Full-page cache purge when gating settings change
//! - Prometheus metrics
//! - Health monitoring

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use uc_core::{
    config::GatewayConfig,
    session::{hash_password, SessionSigner},
};
use uc_gateway::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "uc-gateway")]
#[command(about = "Under Construction Gateway - Maintenance-mode front for a website", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,

    /// Print the password_sha256 value for a password and exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,

    /// Print a fresh hex session_secret and exit
    #[arg(long)]
    generate_secret: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    if let Some(password) = &args.hash_password {
        println!("{}", hash_password(password));
        return Ok(());
    }
    if args.generate_secret {
        println!("{}", hex::encode(SessionSigner::generate_key()));
        return Ok(());
    }

    // Initialize tracing
    let log_level = args
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Under Construction Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        GatewayConfig::from_env().context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        GatewayConfig::from_file(&args.config)
            .context("Failed to load configuration from file")?
    };

    info!("Listen address: {}", config.listen_address);
    info!("Upstream site: {}", config.upstream_url);
    if config.users.is_empty() {
        warn!("No user accounts configured, the settings form is unreachable");
    }

    // Parse listen address
    let addr: SocketAddr = config
        .listen_address
        .parse()
        .context("Invalid listen address")?;

    // Create application state
    let state = AppState::from_config(config)?;
    info!("Settings store: {}", state.store.kind());

    let app = build_router(state);

    info!("Starting server on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
