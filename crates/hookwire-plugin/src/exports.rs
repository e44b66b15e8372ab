//! Registration bundles handed over by plugin units.

use std::sync::Arc;

use crate::hooks::definitions::{BehaviorMetadata, HookKey};
use crate::traits::Behavior;

/// Constructs a fresh behavior instance for a registry entry.
pub type BehaviorFactory = Arc<dyn Fn() -> Arc<dyn Behavior> + Send + Sync>;

/// A unit's self-registration: identity, declared metadata and factory.
///
/// Compiled-in units pass it to
/// [`StaticRegistry::register`](crate::registry::StaticRegistry::register);
/// dynamically loaded units return it from their entry symbol.
pub struct PluginRegistration {
    /// Globally unique plugin identity.
    pub identity: String,
    /// Declared metadata, including the hook point.
    pub metadata: BehaviorMetadata,
    /// Behavior factory.
    pub factory: BehaviorFactory,
}

impl std::fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("identity", &self.identity)
            .field("metadata", &self.metadata)
            .field("factory", &"<fn>")
            .finish()
    }
}

impl PluginRegistration {
    /// Creates a registration whose metadata name is the identity.
    pub fn new<F>(identity: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Behavior> + Send + Sync + 'static,
    {
        Self {
            identity: identity.to_string(),
            metadata: BehaviorMetadata::new(identity),
            factory: Arc::new(factory),
        }
    }

    /// Replaces the declared metadata. An empty name becomes the identity.
    pub fn with_metadata(mut self, mut metadata: BehaviorMetadata) -> Self {
        if metadata.name.is_empty() {
            metadata.name = self.identity.clone();
        }
        self.metadata = metadata;
        self
    }

    /// Sets the hook point.
    pub fn at(mut self, hook: HookKey) -> Self {
        self.metadata.hook = Some(hook);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.metadata.priority = priority;
        self
    }
}
