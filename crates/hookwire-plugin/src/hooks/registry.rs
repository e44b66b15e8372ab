//! Hook registry: per hook point, an ordered list of behaviors with metadata.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::info;

use super::definitions::{BehaviorMetadata, HookKey};
use crate::error::{PluginError, PluginResult};
use crate::traits::Behavior;

/// Entry in the hook registry.
#[derive(Debug, Clone)]
pub struct HookEntry {
    /// The behavior.
    pub behavior: Arc<dyn Behavior>,
    /// Registered metadata, defaults already filled from the behavior.
    pub metadata: BehaviorMetadata,
    /// Registration sequence number, breaks priority ties.
    seq: u64,
}

impl HookEntry {
    /// Returns the behavior name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns whether the behavior runs on dispatch.
    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }
}

/// Registry of behaviors organized by hook point.
///
/// Lists are kept sorted by (priority ascending, registration order).
/// Empty lists are removed, so a listed hook point always has behaviors.
#[derive(Debug)]
pub struct HookRegistry {
    /// Hook point → sorted list of behaviors.
    entries: RwLock<HashMap<HookKey, Vec<HookEntry>>>,
    /// Next registration sequence number.
    next_seq: AtomicU64,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a behavior at a hook point.
    ///
    /// Empty metadata fields default to the behavior's own self-description.
    pub async fn register(
        &self,
        hook: HookKey,
        behavior: Arc<dyn Behavior>,
        metadata: BehaviorMetadata,
    ) -> PluginResult<()> {
        let metadata = fill_defaults(&hook, behavior.as_ref(), metadata);

        let mut entries = self.entries.write().await;
        ensure_free(&entries, &hook, &metadata.name, None)?;
        self.insert(&mut entries, hook, behavior, metadata);
        Ok(())
    }

    /// Atomically replaces a registration.
    ///
    /// Removes `previous` (hook point and name) if it is present and inserts
    /// the new behavior under the same write lock, so no dispatch snapshot
    /// observes the hook point without either version.
    pub async fn replace(
        &self,
        previous: Option<(&HookKey, &str)>,
        hook: HookKey,
        behavior: Arc<dyn Behavior>,
        metadata: BehaviorMetadata,
    ) -> PluginResult<()> {
        let metadata = fill_defaults(&hook, behavior.as_ref(), metadata);

        let mut entries = self.entries.write().await;
        ensure_free(&entries, &hook, &metadata.name, previous)?;

        if let Some((old_hook, old_name)) = previous {
            remove_entry(&mut entries, old_hook, old_name);
        }
        self.insert(&mut entries, hook, behavior, metadata);
        Ok(())
    }

    /// Unregisters a behavior from a hook point.
    pub async fn unregister(&self, hook: &HookKey, name: &str) -> PluginResult<()> {
        let mut entries = self.entries.write().await;
        let list = entries
            .get(hook)
            .ok_or_else(|| PluginError::UnknownHookPoint(hook.to_string()))?;

        if !list.iter().any(|e| e.metadata.name == name) {
            return Err(PluginError::UnknownBehavior {
                hook: hook.to_string(),
                name: name.to_string(),
            });
        }

        remove_entry(&mut entries, hook, name);
        info!(hook = %hook, plugin = %name, "Behavior unregistered");
        Ok(())
    }

    /// Enables or disables a behavior without removing it.
    pub async fn set_enabled(&self, hook: &HookKey, name: &str, enabled: bool) -> PluginResult<()> {
        let mut entries = self.entries.write().await;
        let list = entries
            .get_mut(hook)
            .ok_or_else(|| PluginError::UnknownHookPoint(hook.to_string()))?;

        let entry = list
            .iter_mut()
            .find(|e| e.metadata.name == name)
            .ok_or_else(|| PluginError::UnknownBehavior {
                hook: hook.to_string(),
                name: name.to_string(),
            })?;

        entry.metadata.enabled = enabled;
        info!(hook = %hook, plugin = %name, enabled, "Behavior toggled");
        Ok(())
    }

    /// Returns a copy of the ordered list for a hook point.
    pub async fn snapshot(&self, hook: &HookKey) -> Vec<HookEntry> {
        let entries = self.entries.read().await;
        entries.get(hook).cloned().unwrap_or_default()
    }

    /// Returns the metadata of every behavior at a hook point, in execution order.
    pub async fn get_plugins(&self, hook: &HookKey) -> Vec<BehaviorMetadata> {
        let entries = self.entries.read().await;
        entries
            .get(hook)
            .map(|list| list.iter().map(|e| e.metadata.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the metadata of every registered behavior, grouped by hook point.
    pub async fn get_all_plugins(&self) -> BTreeMap<HookKey, Vec<BehaviorMetadata>> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(hook, list)| {
                (
                    hook.clone(),
                    list.iter().map(|e| e.metadata.clone()).collect(),
                )
            })
            .collect()
    }

    /// Returns all hook points with at least one behavior, sorted.
    pub async fn list_hook_points(&self) -> Vec<HookKey> {
        let entries = self.entries.read().await;
        let mut hooks: Vec<HookKey> = entries.keys().cloned().collect();
        hooks.sort();
        hooks
    }

    /// Returns whether a behavior with the given name is registered at a hook point.
    pub async fn contains(&self, hook: &HookKey, name: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(hook)
            .map(|list| list.iter().any(|e| e.metadata.name == name))
            .unwrap_or(false)
    }

    fn insert(
        &self,
        entries: &mut HashMap<HookKey, Vec<HookEntry>>,
        hook: HookKey,
        behavior: Arc<dyn Behavior>,
        metadata: BehaviorMetadata,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let name = metadata.name.clone();
        let priority = metadata.priority;

        let list = entries.entry(hook.clone()).or_default();
        list.push(HookEntry {
            behavior,
            metadata,
            seq,
        });
        list.sort_by_key(|e| (e.metadata.priority, e.seq));

        info!(
            hook = %hook,
            plugin = %name,
            priority,
            "Behavior registered"
        );
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fill_defaults(
    hook: &HookKey,
    behavior: &dyn Behavior,
    mut metadata: BehaviorMetadata,
) -> BehaviorMetadata {
    if metadata.name.is_empty() {
        metadata.name = behavior.name().to_string();
    }
    if metadata.description.is_empty() {
        metadata.description = behavior.description().to_string();
    }
    if metadata.version.is_empty() {
        metadata.version = behavior.version().to_string();
    }
    metadata.hook = Some(hook.clone());
    metadata
}

/// Fails with `NamedConflict` if `name` is taken at `hook`, unless the
/// taken slot is the one about to be replaced.
fn ensure_free(
    entries: &HashMap<HookKey, Vec<HookEntry>>,
    hook: &HookKey,
    name: &str,
    replacing: Option<(&HookKey, &str)>,
) -> PluginResult<()> {
    if replacing == Some((hook, name)) {
        return Ok(());
    }
    let taken = entries
        .get(hook)
        .map(|list| list.iter().any(|e| e.metadata.name == name))
        .unwrap_or(false);
    if taken {
        return Err(PluginError::NamedConflict {
            hook: hook.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

fn remove_entry(entries: &mut HashMap<HookKey, Vec<HookEntry>>, hook: &HookKey, name: &str) {
    if let Some(list) = entries.get_mut(hook) {
        list.retain(|e| e.metadata.name != name);
        if list.is_empty() {
            entries.remove(hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::definitions::{Action, Timing};
    use crate::traits::FnBehavior;

    fn noop(name: &str) -> Arc<dyn Behavior> {
        FnBehavior::new(name, |_, _, _| async { Ok(()) })
            .with_description(format!("{name} behavior"))
            .with_version("2.0.0")
            .shared()
    }

    fn key() -> HookKey {
        HookKey::new("widget", Timing::After, Action::Create)
    }

    #[tokio::test]
    async fn test_register_fills_defaults_from_behavior() {
        let registry = HookRegistry::new();
        registry
            .register(key(), noop("audit"), BehaviorMetadata::default())
            .await
            .unwrap();

        let plugins = registry.get_plugins(&key()).await;
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "audit");
        assert_eq!(plugins[0].description, "audit behavior");
        assert_eq!(plugins[0].version, "2.0.0");
        assert_eq!(plugins[0].hook, Some(key()));
        assert!(plugins[0].enabled);
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let registry = HookRegistry::new();
        let err = registry.unregister(&key(), "audit").await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownHookPoint(_)));

        registry
            .register(key(), noop("audit"), BehaviorMetadata::new("audit"))
            .await
            .unwrap();
        let err = registry.unregister(&key(), "other").await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownBehavior { .. }));
    }

    #[tokio::test]
    async fn test_last_unregister_removes_hook_point() {
        let registry = HookRegistry::new();
        registry
            .register(key(), noop("audit"), BehaviorMetadata::new("audit"))
            .await
            .unwrap();
        assert_eq!(registry.list_hook_points().await, vec![key()]);

        registry.unregister(&key(), "audit").await.unwrap();
        assert!(registry.list_hook_points().await.is_empty());
        assert!(registry.get_all_plugins().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_swaps_in_one_step() {
        let registry = HookRegistry::new();
        registry
            .register(
                key(),
                noop("audit"),
                BehaviorMetadata::new("audit").with_version("1.0.0"),
            )
            .await
            .unwrap();

        registry
            .replace(
                Some((&key(), "audit")),
                key(),
                noop("audit"),
                BehaviorMetadata::new("audit").with_version("1.1.0"),
            )
            .await
            .unwrap();

        let plugins = registry.get_plugins(&key()).await;
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].version, "1.1.0");
    }

    #[tokio::test]
    async fn test_replace_moves_between_hook_points() {
        let registry = HookRegistry::new();
        let other = HookKey::new("widget", Timing::Before, Action::Update);
        registry
            .register(key(), noop("audit"), BehaviorMetadata::new("audit"))
            .await
            .unwrap();

        registry
            .replace(
                Some((&key(), "audit")),
                other.clone(),
                noop("audit"),
                BehaviorMetadata::new("audit"),
            )
            .await
            .unwrap();

        assert_eq!(registry.list_hook_points().await, vec![other]);
    }

    #[tokio::test]
    async fn test_replace_conflict_keeps_previous() {
        let registry = HookRegistry::new();
        registry
            .register(key(), noop("audit"), BehaviorMetadata::new("audit"))
            .await
            .unwrap();
        registry
            .register(key(), noop("notify"), BehaviorMetadata::new("notify"))
            .await
            .unwrap();

        let err = registry
            .replace(
                Some((&key(), "audit")),
                key(),
                noop("notify"),
                BehaviorMetadata::new("notify"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NamedConflict { .. }));
        assert!(registry.contains(&key(), "audit").await);
    }
}
