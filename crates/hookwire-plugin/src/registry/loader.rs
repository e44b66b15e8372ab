//! Loader adapter: moves static registry entries into the dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{RegistryEntry, StaticRegistry};
use crate::error::{PluginError, PluginResult};
use crate::exports::PluginRegistration;
use crate::hooks::definitions::HookKey;
use crate::manager::PluginManager;

/// Where an identity's behavior currently sits in the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRegistration {
    /// Hook point.
    pub hook: HookKey,
    /// Registered behavior name.
    pub name: String,
}

/// Registers static registry entries into the [`PluginManager`].
///
/// Tracks, per identity, which dispatch-table slot holds the active
/// behavior so a reload can swap it out in one step.
#[derive(Debug)]
pub struct RegistryLoader {
    /// Source of factories and metadata.
    registry: Arc<StaticRegistry>,
    /// Target dispatch table.
    manager: Arc<PluginManager>,
    /// Identity → active dispatch-table slot.
    active: RwLock<HashMap<String, ActiveRegistration>>,
}

impl RegistryLoader {
    /// Creates a loader adapter.
    pub fn new(registry: Arc<StaticRegistry>, manager: Arc<PluginManager>) -> Self {
        Self {
            registry,
            manager,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Registers every enabled entry. Stops at the first failure.
    ///
    /// Returns the number of behaviors registered.
    pub async fn load_all(&self) -> PluginResult<usize> {
        let mut loaded = 0;
        for (identity, entry) in self.registry.entries().await {
            if !entry.metadata.enabled {
                debug!(plugin = %identity, "Skipping disabled plugin");
                continue;
            }
            self.register_entry(&identity, entry).await?;
            loaded += 1;
        }
        info!(count = loaded, "Static plugins loaded");
        Ok(loaded)
    }

    /// Registers one entry.
    pub async fn load(&self, identity: &str) -> PluginResult<()> {
        let entry = self.registry.get(identity).await?;
        if !entry.metadata.enabled {
            return Err(PluginError::Disabled(identity.to_string()));
        }
        self.register_entry(identity, entry).await
    }

    /// Re-registers one entry from its current registry state.
    ///
    /// The previously active behavior, if any, is swapped out atomically. A
    /// disabled entry only removes the previous behavior.
    pub async fn reload(&self, identity: &str) -> PluginResult<()> {
        let entry = self.registry.get(identity).await?;
        let mut active = self.active.write().await;
        let previous = active.get(identity).cloned();

        if !entry.metadata.enabled {
            if let Some(prev) = previous {
                if let Err(e) = self.manager.unregister(&prev.hook, &prev.name).await {
                    debug!(plugin = %identity, error = %e, "Previous behavior already gone");
                }
                active.remove(identity);
            }
            info!(plugin = %identity, "Plugin disabled, removed from dispatch table");
            return Ok(());
        }

        let hook = entry
            .metadata
            .hook
            .clone()
            .ok_or_else(|| PluginError::MissingHookPoint(identity.to_string()))?;
        let name = entry.metadata.name.clone();
        let behavior = (entry.factory)();

        self.manager
            .replace(
                previous.as_ref().map(|p| (&p.hook, p.name.as_str())),
                hook.clone(),
                behavior,
                entry.metadata,
            )
            .await?;

        info!(
            plugin = %identity,
            hook = %hook,
            replaced = previous.is_some(),
            "Plugin reloaded"
        );
        active.insert(identity.to_string(), ActiveRegistration { hook, name });
        Ok(())
    }

    /// Registers a dynamically loaded unit's registration and swaps it into
    /// the dispatch table.
    ///
    /// `superseded` is the identity the unit's previous version registered
    /// under. When the new version registers under a different identity,
    /// the old behavior is disabled once the new one is active. On failure
    /// the registry entry is rolled back and the previous behavior stays.
    ///
    /// Returns the identity the registration was stored under.
    pub async fn activate_loaded(
        &self,
        registration: PluginRegistration,
        superseded: Option<&str>,
    ) -> PluginResult<String> {
        let identity = registration.identity.clone();
        let previous = self.registry.register_loaded(registration).await?;

        if let Err(e) = self.reload(&identity).await {
            self.registry.restore_loaded(&identity, previous).await;
            return Err(e);
        }

        if let Some(old) = superseded.filter(|old| *old != identity) {
            info!(plugin = %identity, previous = %old, "Unit changed identity, retiring previous behavior");
            if let Err(e) = self.deactivate(old).await {
                debug!(plugin = %old, error = %e, "Previous behavior already gone");
            }
        }
        Ok(identity)
    }

    /// Registers every enabled entry declared for a hook point.
    ///
    /// Fails if none is available.
    pub async fn load_by_hook_point(&self, hook: &HookKey) -> PluginResult<usize> {
        let mut loaded = 0;
        for (identity, entry) in self.registry.entries().await {
            if !entry.metadata.enabled || entry.metadata.hook.as_ref() != Some(hook) {
                continue;
            }
            self.register_entry(&identity, entry).await?;
            loaded += 1;
        }

        if loaded == 0 {
            return Err(PluginError::UnknownHookPoint(hook.to_string()));
        }
        Ok(loaded)
    }

    /// Registers the named entries in order. Stops at the first failure.
    pub async fn load_by_names<I, S>(&self, names: I) -> PluginResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.load(name.as_ref()).await?;
        }
        Ok(())
    }

    /// Disables the identity's active behavior, leaving it registered.
    pub async fn deactivate(&self, identity: &str) -> PluginResult<()> {
        let active = self.active.read().await;
        let slot = active
            .get(identity)
            .ok_or_else(|| PluginError::UnknownIdentity(identity.to_string()))?;
        self.manager.disable(&slot.hook, &slot.name).await
    }

    /// Returns the active dispatch-table slot of an identity.
    pub async fn active(&self, identity: &str) -> Option<ActiveRegistration> {
        self.active.read().await.get(identity).cloned()
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Arc<StaticRegistry> {
        &self.registry
    }

    /// Returns the target manager.
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    async fn register_entry(&self, identity: &str, entry: RegistryEntry) -> PluginResult<()> {
        let hook = entry
            .metadata
            .hook
            .clone()
            .ok_or_else(|| PluginError::MissingHookPoint(identity.to_string()))?;
        let name = entry.metadata.name.clone();
        let behavior = (entry.factory)();

        let mut active = self.active.write().await;
        if let Err(e) = self
            .manager
            .register(hook.clone(), behavior, entry.metadata)
            .await
        {
            warn!(plugin = %identity, hook = %hook, error = %e, "Plugin registration failed");
            return Err(e);
        }
        active.insert(identity.to_string(), ActiveRegistration { hook, name });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::definitions::{Action, BehaviorMetadata, Timing};
    use crate::traits::{Behavior, FnBehavior};

    fn registration(identity: &str, hook: HookKey, enabled: bool) -> PluginRegistration {
        let name = identity.to_string();
        PluginRegistration::new(identity, move || -> Arc<dyn Behavior> {
            FnBehavior::new(&name, |_, _, _| async { Ok(()) }).shared()
        })
        .with_metadata(
            BehaviorMetadata::new(identity)
                .at(hook)
                .with_enabled(enabled),
        )
    }

    fn create_hook() -> HookKey {
        HookKey::new("widget", Timing::After, Action::Create)
    }

    async fn setup() -> (Arc<StaticRegistry>, Arc<PluginManager>, RegistryLoader) {
        let registry = Arc::new(StaticRegistry::new());
        registry
            .register(registration("audit", create_hook(), true))
            .await
            .unwrap();
        registry
            .register(registration("notify", create_hook(), true))
            .await
            .unwrap();
        registry
            .register(registration(
                "archive",
                HookKey::new("widget", Timing::Before, Action::Delete),
                false,
            ))
            .await
            .unwrap();
        registry.seal();

        let manager = Arc::new(PluginManager::new());
        let loader = RegistryLoader::new(registry.clone(), manager.clone());
        (registry, manager, loader)
    }

    #[tokio::test]
    async fn test_load_all_skips_disabled() {
        let (_registry, manager, loader) = setup().await;
        assert_eq!(loader.load_all().await.unwrap(), 2);
        assert_eq!(manager.list_hook_points().await, vec![create_hook()]);
        assert_eq!(manager.get_plugins(&create_hook()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_disabled_entry_fails() {
        let (_registry, _manager, loader) = setup().await;
        let err = loader.load("archive").await.unwrap_err();
        assert!(matches!(err, PluginError::Disabled(_)));
    }

    #[tokio::test]
    async fn test_load_by_hook_point() {
        let (_registry, manager, loader) = setup().await;
        assert_eq!(loader.load_by_hook_point(&create_hook()).await.unwrap(), 2);

        let empty = HookKey::new("widget", Timing::Before, Action::Delete);
        let err = loader.load_by_hook_point(&empty).await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownHookPoint(_)));
        assert_eq!(manager.list_hook_points().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_by_names_stops_on_conflict() {
        let (_registry, _manager, loader) = setup().await;
        let err = loader
            .load_by_names(["audit", "audit"])
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NamedConflict { .. }));
        assert!(loader.active("audit").await.is_some());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_registry_state() {
        let (registry, manager, loader) = setup().await;
        let hook = HookKey::new("gadget", Timing::After, Action::Update);
        registry
            .register_loaded(registration("hot", hook.clone(), true))
            .await
            .unwrap();
        loader.reload("hot").await.unwrap();

        let moved = HookKey::new("gadget", Timing::Before, Action::Update);
        registry
            .register_loaded(registration("hot", moved.clone(), true))
            .await
            .unwrap();
        loader.reload("hot").await.unwrap();

        assert!(manager.get_plugins(&hook).await.is_empty());
        assert_eq!(manager.get_plugins(&moved).await.len(), 1);
        assert_eq!(loader.active("hot").await.unwrap().hook, moved);
    }

    #[tokio::test]
    async fn test_activate_loaded_retires_renamed_identity() {
        let (_registry, manager, loader) = setup().await;
        loader
            .activate_loaded(registration("hot_v1", create_hook(), true), None)
            .await
            .unwrap();

        let stored = loader
            .activate_loaded(registration("hot_v2", create_hook(), true), Some("hot_v1"))
            .await
            .unwrap();
        assert_eq!(stored, "hot_v2");

        let plugins = manager.get_plugins(&create_hook()).await;
        let enabled: Vec<&str> = plugins
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(enabled, vec!["hot_v2"]);
    }

    #[tokio::test]
    async fn test_activate_loaded_rolls_back_on_failure() {
        let (registry, manager, loader) = setup().await;
        loader
            .activate_loaded(registration("hot", create_hook(), true), None)
            .await
            .unwrap();

        let mut broken = registration("hot", create_hook(), true);
        broken.metadata.hook = None;
        let err = loader
            .activate_loaded(broken, Some("hot"))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::MissingHookPoint(_)));

        assert!(registry.get("hot").await.unwrap().metadata.hook.is_some());
        let plugins = manager.get_plugins(&create_hook()).await;
        assert_eq!(plugins.len(), 1);
        assert!(plugins[0].enabled);
    }

    #[tokio::test]
    async fn test_deactivate_keeps_behavior_listed() {
        let (_registry, manager, loader) = setup().await;
        loader.load("audit").await.unwrap();
        loader.deactivate("audit").await.unwrap();

        let plugins = manager.get_plugins(&create_hook()).await;
        assert_eq!(plugins.len(), 1);
        assert!(!plugins[0].enabled);

        let err = loader.deactivate("notify").await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownIdentity(_)));
    }
}
