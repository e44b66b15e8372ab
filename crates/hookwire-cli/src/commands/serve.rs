//! Run the plugin system in the foreground.

use clap::Args;

use hookwire_core::error::AppError;
use hookwire_plugin::setup::PluginSystem;

use crate::output::{self, OutputFormat};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Disable the filesystem watcher
    #[arg(long)]
    pub no_watch: bool,

    /// Keep only compiled-in plugins
    #[arg(long)]
    pub static_only: bool,

    /// Override the plugin source directory
    #[arg(long)]
    pub runtime_dir: Option<String>,
}

/// Execute the serve command
pub async fn execute(
    args: &ServeArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let mut config = super::load_config(config_path).await?;
    if args.no_watch {
        config.plugins.enable_watch = false;
    }
    if args.static_only {
        config.plugins.hotload = false;
    }
    if let Some(dir) = &args.runtime_dir {
        config.plugins.runtime_dir = dir.clone();
    }

    println!("Starting Hookwire plugin system...");
    println!("  Runtime dir: {}", config.plugins.runtime_dir);
    println!("  Compiled dir: {}", config.plugins.compiled_dir);

    let builder = PluginSystem::builder(config.plugins);
    plugin_builtin::register_all(builder.registry()).await?;
    let system = builder.start().await?;

    output::print_item(&system.status().await, format);
    output::print_success("Plugin system running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl+C: {}", e)))?;

    system.shutdown().await;
    output::print_success("Plugin system stopped");
    Ok(())
}
