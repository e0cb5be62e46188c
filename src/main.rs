//! Parley Server: real-time group chat core.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use parley_core::config::AppConfig;
use parley_core::error::AppError;
use parley_realtime::RealtimeEngine;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "parley-server", version, about = "Real-time group chat server")]
struct Cli {
    /// Configuration environment; selects `{config_dir}/{env}.toml`.
    #[arg(long, env = "PARLEY_ENV", default_value = "development")]
    env: String,

    /// Directory holding `default.toml` and the environment overlays.
    #[arg(long, default_value = "config")]
    config_dir: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config_dir, &cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %cli.env, config_dir = %cli.config_dir, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Stores ───────────────────────────────────────────
    tracing::info!(provider = ?config.database.provider, "Connecting stores...");
    let stores = parley_database::connect(&config.database).await?;

    // ── Step 2: Broker publisher ─────────────────────────────────
    let publisher = parley_realtime::bridge::build_publisher(&config.broker).await?;

    // ── Step 3: Real-time engine + sweepers ──────────────────────
    let engine = Arc::new(RealtimeEngine::new(&config, stores, publisher));
    let background = engine.start_background_tasks();

    // ── Step 4: HTTP server ──────────────────────────────────────
    let addr = config.server.bind_address();
    let app = parley_api::build_router(parley_api::AppState::new(config, engine.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("Parley server listening on {}", addr);

    // ── Step 5: Graceful shutdown ────────────────────────────────
    let shutdown_engine = engine.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            // Open WebSockets would otherwise keep the server draining forever.
            shutdown_engine.shutdown("Server is shutting down");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    for handle in background {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    tracing::info!("Parley server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
