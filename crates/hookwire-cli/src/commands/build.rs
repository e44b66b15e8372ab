//! Compile a plugin unit without loading it.

use clap::Args;

use hookwire_core::error::AppError;
use hookwire_plugin::hotload::PluginCompiler;

use crate::output::{self, OutputFormat};

/// Arguments for the build command
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Unit name (subdirectory of the runtime directory)
    pub unit: String,

    /// Build with the debug profile
    #[arg(long)]
    pub debug: bool,

    /// Remove the installed artifact instead of building
    #[arg(long)]
    pub clean: bool,
}

/// Execute the build command
pub async fn execute(
    args: &BuildArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let mut config = super::load_config(config_path).await?;
    if args.debug {
        config.plugins.release = false;
    }
    let compiler = PluginCompiler::new(&config.plugins);

    if args.clean {
        compiler.clean(&args.unit).await?;
        output::print_success(&format!("Removed artifact for '{}'", args.unit));
        return Ok(());
    }

    let result = compiler.compile(&args.unit).await;
    if format == OutputFormat::Json {
        output::print_item(&result, format);
    }

    match (&result.artifact_path, &result.error) {
        (Some(path), _) if result.success => {
            if format == OutputFormat::Table {
                output::print_success(&format!(
                    "Built '{}' in {} ms",
                    args.unit, result.duration_ms
                ));
                output::print_kv("Artifact", &path.display().to_string());
                output::print_kv("Digest", result.digest.as_deref().unwrap_or("-"));
            }
            Ok(())
        }
        (_, error) => {
            let diagnostics = error.clone().unwrap_or_default();
            if format == OutputFormat::Table {
                output::print_error(&format!("Build of '{}' failed", args.unit));
                eprintln!("{}", diagnostics);
            }
            Err(AppError::plugin(format!("Build of '{}' failed", args.unit)))
        }
    }
}
