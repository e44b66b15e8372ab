//! Registration of the compiled-in behaviors.

use std::sync::Arc;

use hookwire_plugin::error::PluginResult;
use hookwire_plugin::exports::PluginRegistration;
use hookwire_plugin::hooks::definitions::{Action, BehaviorMetadata, HookKey, Timing};
use hookwire_plugin::registry::StaticRegistry;
use hookwire_plugin::traits::Behavior;

use crate::hooks::{SysTableAuditHook, SysTableDeleteGuardHook};

const AUTHOR: &str = "Hookwire Team";

/// Registers every compiled-in unit. Must run before the registry is sealed.
pub async fn register_all(registry: &StaticRegistry) -> PluginResult<()> {
    let version = env!("CARGO_PKG_VERSION");

    registry
        .register(
            PluginRegistration::new("sys_table_audit", || {
                Arc::new(SysTableAuditHook) as Arc<dyn Behavior>
            })
            .with_metadata(
                BehaviorMetadata::new("sys_table_audit")
                    .at(HookKey::new("sys_table", Timing::After, Action::Create))
                    .with_description("Logs tables added to the catalog")
                    .with_version(version)
                    .with_author(AUTHOR),
            ),
        )
        .await?;

    registry
        .register(
            PluginRegistration::new("sys_table_delete_guard", || {
                Arc::new(SysTableDeleteGuardHook) as Arc<dyn Behavior>
            })
            .with_metadata(
                BehaviorMetadata::new("sys_table_delete_guard")
                    .at(HookKey::new("sys_table", Timing::Before, Action::Delete))
                    .with_priority(10)
                    .with_description("Prevents deleting system tables")
                    .with_version(version)
                    .with_author(AUTHOR),
            ),
        )
        .await?;

    tracing::info!(count = 2, "Built-in plugins registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwire_plugin::error::PluginError;
    use hookwire_plugin::hooks::definitions::EventRecord;
    use hookwire_plugin::manager::PluginManager;
    use hookwire_plugin::registry::RegistryLoader;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_register_all_then_dispatch() {
        let registry = Arc::new(StaticRegistry::new());
        register_all(&registry).await.unwrap();
        registry.seal();
        assert_eq!(
            registry.list().await,
            vec!["sys_table_audit", "sys_table_delete_guard"]
        );

        let manager = Arc::new(PluginManager::new());
        let loader = RegistryLoader::new(registry, manager.clone());
        assert_eq!(loader.load_all().await.unwrap(), 2);

        let token = CancellationToken::new();
        let delete = EventRecord::new("sys_table", Timing::Before, Action::Delete)
            .with_field("IS_SYSTEM", json!("Y"))
            .with_field("TABLE_NAME", json!("sys_role"));
        let err = manager.execute(&token, &delete).await.unwrap_err();
        assert!(
            matches!(err, PluginError::BehaviorFailed { ref name, .. } if name == "sys_table_delete_guard")
        );

        let create = EventRecord::new("sys_table", Timing::After, Action::Create)
            .with_field("TABLE_NAME", json!("orders"));
        manager.execute(&token, &create).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_twice_is_duplicate() {
        let registry = StaticRegistry::new();
        register_all(&registry).await.unwrap();
        let err = register_all(&registry).await.unwrap_err();
        assert!(matches!(err, PluginError::DuplicateIdentity(ref id) if id == "sys_table_audit"));
    }
}
