//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use hookwire_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file plus environment)
    Show,
    /// Validate the configuration
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path).await?;
            output::print_item(&config, format);
        }
        ConfigCommand::Validate => {
            let config = match super::load_config(config_path).await {
                Ok(config) => config,
                Err(e) => {
                    output::print_error(&format!("Configuration invalid: {}", e));
                    return Err(e);
                }
            };

            let plugins = &config.plugins;
            if plugins.source_extensions.is_empty() {
                output::print_error("plugins.source_extensions must not be empty");
                return Err(AppError::configuration("plugins.source_extensions is empty"));
            }
            if plugins.toolchain.trim().is_empty() {
                output::print_error("plugins.toolchain must not be empty");
                return Err(AppError::configuration("plugins.toolchain is empty"));
            }

            output::print_success(&format!("Configuration '{}' is valid", config_path));
            output::print_kv("Runtime dir", &plugins.runtime_dir);
            output::print_kv("Compiled dir", &plugins.compiled_dir);
            output::print_kv("Hot-load", &plugins.hotload.to_string());
            output::print_kv("Watch", &plugins.enable_watch.to_string());
            output::print_kv("Debounce", &format!("{} ms", plugins.debounce_ms));
            output::print_kv("Toolchain", &plugins.toolchain);
            output::print_kv(
                "Logging",
                &format!("{} ({})", config.logging.level, config.logging.format),
            );
            if !plugins.runtime_path().is_dir() {
                output::print_warning(&format!(
                    "Runtime dir '{}' does not exist yet; it is created on start",
                    plugins.runtime_dir
                ));
            }
        }
    }

    Ok(())
}
