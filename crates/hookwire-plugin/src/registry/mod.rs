//! Static registry: identity → behavior factory plus declared metadata.
//!
//! Populated in an explicit setup phase by compiled-in units, then sealed.
//! After sealing, only the dynamic loader may add entries, through
//! [`StaticRegistry::register_loaded`].

pub mod loader;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::exports::{BehaviorFactory, PluginRegistration};
use crate::hooks::definitions::BehaviorMetadata;

pub use loader::RegistryLoader;

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Compiled into the process binary.
    Static,
    /// Registered by a dynamically loaded artifact.
    Dynamic,
}

/// Entry in the static registry.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Behavior factory.
    pub factory: BehaviorFactory,
    /// Declared metadata.
    pub metadata: BehaviorMetadata,
    /// Origin of the entry.
    pub origin: Origin,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("metadata", &self.metadata)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Process-wide registration table, passed by reference to setup code.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    /// Identity → entry.
    entries: RwLock<HashMap<String, RegistryEntry>>,
    /// Set once the setup phase is over.
    sealed: AtomicBool,
}

impl StaticRegistry {
    /// Creates an empty, unsealed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compiled-in unit.
    ///
    /// A duplicate identity is a build-time defect; callers treat
    /// [`PluginError::DuplicateIdentity`] as fatal.
    pub async fn register(&self, registration: PluginRegistration) -> PluginResult<()> {
        if self.is_sealed() {
            return Err(PluginError::RegistrationClosed(registration.identity));
        }

        let PluginRegistration {
            identity,
            mut metadata,
            factory,
        } = registration;
        if metadata.name.is_empty() {
            metadata.name = identity.clone();
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&identity) {
            return Err(PluginError::DuplicateIdentity(identity));
        }

        debug!(
            plugin = %identity,
            hook = ?metadata.hook.as_ref().map(|h| h.to_string()),
            "Static plugin registered"
        );
        entries.insert(
            identity,
            RegistryEntry {
                factory,
                metadata,
                origin: Origin::Static,
            },
        );
        Ok(())
    }

    /// Registers or replaces the entry of a dynamically loaded unit.
    ///
    /// Returns the previous entry when an earlier version of the same unit
    /// was registered. An identity owned by a compiled-in unit is rejected.
    pub async fn register_loaded(
        &self,
        registration: PluginRegistration,
    ) -> PluginResult<Option<RegistryEntry>> {
        let PluginRegistration {
            identity,
            mut metadata,
            factory,
        } = registration;
        if metadata.name.is_empty() {
            metadata.name = identity.clone();
        }

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&identity) {
            if existing.origin == Origin::Static {
                return Err(PluginError::DuplicateIdentity(identity));
            }
        }

        info!(plugin = %identity, version = %metadata.version, "Dynamic plugin registered");
        let previous = entries.insert(
            identity,
            RegistryEntry {
                factory,
                metadata,
                origin: Origin::Dynamic,
            },
        );
        Ok(previous)
    }

    /// Puts back the entry `register_loaded` displaced, or removes the
    /// dynamic entry if there was none.
    pub async fn restore_loaded(&self, identity: &str, previous: Option<RegistryEntry>) {
        let mut entries = self.entries.write().await;
        match previous {
            Some(entry) => {
                entries.insert(identity.to_string(), entry);
            }
            None => {
                if entries
                    .get(identity)
                    .is_some_and(|e| e.origin == Origin::Dynamic)
                {
                    entries.remove(identity);
                }
            }
        }
        debug!(plugin = %identity, "Dynamic registration rolled back");
    }

    /// Ends the setup phase; later `register` calls fail.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::SeqCst) {
            info!("Static registry sealed");
        }
    }

    /// Returns whether the setup phase is over.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Gets an entry by identity.
    pub async fn get(&self, identity: &str) -> PluginResult<RegistryEntry> {
        let entries = self.entries.read().await;
        entries
            .get(identity)
            .cloned()
            .ok_or_else(|| PluginError::UnknownIdentity(identity.to_string()))
    }

    /// Lists registered identities, sorted.
    pub async fn list(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a copy of every entry, sorted by identity.
    pub async fn entries(&self) -> Vec<(String, RegistryEntry)> {
        let entries = self.entries.read().await;
        let mut all: Vec<(String, RegistryEntry)> = entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Returns the number of entries.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::traits::{Behavior, FnBehavior};

    fn registration(identity: &str) -> PluginRegistration {
        let name = identity.to_string();
        PluginRegistration::new(identity, move || -> Arc<dyn Behavior> {
            FnBehavior::new(&name, |_, _, _| async { Ok(()) }).shared()
        })
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_rejected() {
        let registry = StaticRegistry::new();
        registry.register(registration("audit")).await.unwrap();
        let err = registry.register(registration("audit")).await.unwrap_err();
        assert!(matches!(err, PluginError::DuplicateIdentity(ref id) if id == "audit"));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_sealed_registry_rejects_static_registration() {
        let registry = StaticRegistry::new();
        registry.seal();
        let err = registry.register(registration("late")).await.unwrap_err();
        assert!(matches!(err, PluginError::RegistrationClosed(_)));
    }

    #[tokio::test]
    async fn test_register_loaded_replaces_dynamic_entry() {
        let registry = StaticRegistry::new();
        registry.seal();

        let first = registry
            .register_loaded(
                registration("hot").with_metadata(BehaviorMetadata::new("hot").with_version("1")),
            )
            .await
            .unwrap();
        assert!(first.is_none());

        let previous = registry
            .register_loaded(
                registration("hot").with_metadata(BehaviorMetadata::new("hot").with_version("2")),
            )
            .await
            .unwrap();
        assert_eq!(previous.map(|e| e.metadata.version), Some("1".to_string()));

        let entry = registry.get("hot").await.unwrap();
        assert_eq!(entry.metadata.version, "2");
        assert_eq!(entry.origin, Origin::Dynamic);
    }

    #[tokio::test]
    async fn test_restore_loaded_rolls_back() {
        let registry = StaticRegistry::new();
        let v1 = registration("hot").with_metadata(BehaviorMetadata::new("hot").with_version("1"));
        registry.register_loaded(v1).await.unwrap();

        let v2 = registration("hot").with_metadata(BehaviorMetadata::new("hot").with_version("2"));
        let previous = registry.register_loaded(v2).await.unwrap();
        registry.restore_loaded("hot", previous).await;
        assert_eq!(registry.get("hot").await.unwrap().metadata.version, "1");

        let fresh = registry.register_loaded(registration("new")).await.unwrap();
        registry.restore_loaded("new", fresh).await;
        assert!(registry.get("new").await.is_err());
    }

    #[tokio::test]
    async fn test_register_loaded_cannot_shadow_static() {
        let registry = StaticRegistry::new();
        registry.register(registration("audit")).await.unwrap();
        registry.seal();

        let err = registry
            .register_loaded(registration("audit"))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateIdentity(_)));
        assert_eq!(registry.get("audit").await.unwrap().origin, Origin::Static);
    }

    #[tokio::test]
    async fn test_get_unknown_identity() {
        let registry = StaticRegistry::new();
        let err = registry.get("missing").await.unwrap_err();
        assert!(matches!(err, PluginError::UnknownIdentity(_)));
    }
}
