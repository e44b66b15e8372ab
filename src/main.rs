//! Hookwire Server: hot-loadable CRUD hook plugins.
//!
//! Main entry point that loads configuration, runs the plugin setup
//! sequence and keeps the hot-load watcher alive until shutdown.

use tracing_subscriber::{EnvFilter, fmt};

use hookwire_core::config::AppConfig;
use hookwire_core::error::AppError;
use hookwire_plugin::setup::PluginSystem;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("HOOKWIRE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    AppConfig::load(&config_path)
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
    tracing::info!("Starting Hookwire v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Register compiled-in plugins ─────────────────────
    let builder = PluginSystem::builder(config.plugins.clone());
    plugin_builtin::register_all(builder.registry())
        .await
        .map_err(|e| AppError::configuration(format!("Plugin registration failed: {}", e)))?;

    // ── Step 2: Seal, load static plugins, start hot-load ────────
    let system = builder.start().await?;
    let status = system.status().await;
    tracing::info!(
        static_only = status.static_only,
        watcher = status.watcher_active,
        dynamic = status.loaded_plugins.len(),
        "Hookwire ready"
    );

    // ── Step 3: Graceful shutdown ────────────────────────────────
    shutdown_signal().await?;
    tracing::info!("Shutdown signal received, stopping plugin system...");
    system.shutdown().await;

    tracing::info!("Hookwire shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() -> Result<(), AppError> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| AppError::internal(format!("Failed to install SIGTERM handler: {}", e)))?;

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.map_err(|e| AppError::internal(format!("Failed to listen for Ctrl+C: {}", e)))?;
            }
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl+C: {}", e)))?;

    Ok(())
}
