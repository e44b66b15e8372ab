//! CLI command definitions and dispatch.

pub mod build;
pub mod config;
pub mod digest;
pub mod hooks;
pub mod serve;
pub mod units;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use hookwire_core::error::AppError;

/// Hookwire: hot-loadable CRUD hook plugins
#[derive(Debug, Parser)]
#[command(name = "hookwire", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "HOOKWIRE_CONFIG", default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the plugin system until Ctrl+C
    Serve(serve::ServeArgs),
    /// Compile one plugin unit
    Build(build::BuildArgs),
    /// Print or check a unit's source digest
    Digest(digest::DigestArgs),
    /// List plugin units under the runtime directory
    Units,
    /// List compiled-in behaviors by hook point
    Hooks,
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.config, self.format).await,
            Commands::Build(args) => build::execute(args, &self.config, self.format).await,
            Commands::Digest(args) => digest::execute(args, &self.config).await,
            Commands::Units => units::execute(&self.config, self.format).await,
            Commands::Hooks => hooks::execute(self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub async fn load_config(config_path: &str) -> Result<hookwire_core::config::AppConfig, AppError> {
    hookwire_core::config::AppConfig::load(config_path)
}
