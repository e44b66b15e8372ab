//! List plugin units and their build state.

use serde::Serialize;
use tabled::Tabled;

use hookwire_core::error::AppError;
use hookwire_plugin::hotload::{PluginCompiler, discover_units};

use crate::output::{self, OutputFormat};

/// One row of the unit listing.
#[derive(Debug, Serialize, Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    name: String,
    #[tabled(rename = "Digest")]
    digest: String,
    #[tabled(rename = "Artifact")]
    artifact: String,
}

/// Execute the units command
pub async fn execute(config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path).await?;
    let root = config.plugins.runtime_path();
    if !root.is_dir() {
        output::print_warning(&format!(
            "Plugin directory '{}' does not exist",
            root.display()
        ));
        return Ok(());
    }

    let compiler = PluginCompiler::new(&config.plugins);
    let names = discover_units(&root)
        .map_err(|e| AppError::internal(format!("Failed to list '{}': {}", root.display(), e)))?;

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let digest = match compiler.digest(&name).await {
            Ok(d) if format == OutputFormat::Table => output::short_digest(&d),
            Ok(d) => d,
            Err(e) => format!("error: {}", e),
        };
        let artifact = compiler.artifact_path(&name);
        let artifact = if artifact.exists() {
            artifact.display().to_string()
        } else {
            "-".to_string()
        };
        rows.push(UnitRow {
            name,
            digest,
            artifact,
        });
    }

    output::print_list(&rows, format);
    Ok(())
}
