//! Print or check a unit's source digest.

use clap::Args;

use hookwire_core::error::AppError;
use hookwire_plugin::hotload::PluginCompiler;

use crate::output;

/// Arguments for the digest command
#[derive(Debug, Args)]
pub struct DigestArgs {
    /// Unit name (subdirectory of the runtime directory)
    pub unit: String,

    /// Compare against a previous digest and report whether a rebuild is needed
    #[arg(long)]
    pub check: Option<String>,
}

/// Execute the digest command
pub async fn execute(args: &DigestArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let compiler = PluginCompiler::new(&config.plugins);

    match &args.check {
        None => {
            let digest = compiler.digest(&args.unit).await?;
            println!("{}", digest);
        }
        Some(previous) => {
            if compiler.needs_rebuild(&args.unit, Some(previous)).await {
                output::print_warning(&format!("'{}' changed, rebuild needed", args.unit));
            } else {
                output::print_success(&format!("'{}' is up to date", args.unit));
            }
        }
    }

    Ok(())
}
