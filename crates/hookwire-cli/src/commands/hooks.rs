//! List compiled-in behaviors grouped by hook point.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use hookwire_core::error::AppError;
use hookwire_plugin::manager::PluginManager;
use hookwire_plugin::registry::{RegistryLoader, StaticRegistry};

use crate::output::{self, OutputFormat};

/// One row of the behavior listing.
#[derive(Debug, Serialize, Tabled)]
struct HookRow {
    #[tabled(rename = "Hook point")]
    hook: String,
    #[tabled(rename = "Behavior")]
    name: String,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "Enabled")]
    enabled: bool,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// Execute the hooks command
pub async fn execute(format: OutputFormat) -> Result<(), AppError> {
    let registry = Arc::new(StaticRegistry::new());
    plugin_builtin::register_all(&registry).await?;
    registry.seal();

    let manager = Arc::new(PluginManager::new());
    RegistryLoader::new(registry, manager.clone())
        .load_all()
        .await?;

    let rows: Vec<HookRow> = manager
        .get_all_plugins()
        .await
        .into_iter()
        .flat_map(|(hook, behaviors)| {
            behaviors.into_iter().map(move |meta| HookRow {
                hook: hook.to_string(),
                name: meta.name,
                priority: meta.priority,
                enabled: meta.enabled,
                version: meta.version,
                description: meta.description,
            })
        })
        .collect();

    output::print_list(&rows, format);
    Ok(())
}
