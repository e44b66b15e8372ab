//! Plugin system setup sequence.
//!
//! 1. Compiled-in units register into the [`StaticRegistry`] through
//!    [`PluginSystemBuilder::registry`].
//! 2. [`PluginSystemBuilder::start`] seals the registry, loads every enabled
//!    entry into the [`PluginManager`], starts the hot-load orchestrator and
//!    logs the resulting inventory.

use std::sync::Arc;

use hookwire_core::config::PluginConfig;
use tracing::{debug, error, info};

use crate::error::PluginResult;
use crate::hooks::definitions::TransactionHandle;
use crate::hotload::{ArtifactLoader, DynamicLoader, HotloadManager, HotloadStatus};
use crate::manager::PluginManager;
use crate::registry::{RegistryLoader, StaticRegistry};

type LoaderFactory = Box<dyn FnOnce(Arc<RegistryLoader>) -> Arc<dyn ArtifactLoader> + Send>;

/// Collects compiled-in registrations before the system starts.
pub struct PluginSystemBuilder {
    config: PluginConfig,
    registry: Arc<StaticRegistry>,
    default_tx: TransactionHandle,
    loader: Option<LoaderFactory>,
}

impl std::fmt::Debug for PluginSystemBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSystemBuilder")
            .field("config", &self.config)
            .field("custom_loader", &self.loader.is_some())
            .finish()
    }
}

impl PluginSystemBuilder {
    /// Returns the registry compiled-in units register into.
    pub fn registry(&self) -> &StaticRegistry {
        &self.registry
    }

    /// Sets the handle used when an event carries no transaction.
    pub fn with_default_tx(mut self, tx: TransactionHandle) -> Self {
        self.default_tx = tx;
        self
    }

    /// Replaces the artifact loader (the `libloading` one by default).
    pub fn with_loader<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<RegistryLoader>) -> Arc<dyn ArtifactLoader> + Send + 'static,
    {
        self.loader = Some(Box::new(factory));
        self
    }

    /// Seals the registry and brings the plugin system up.
    ///
    /// A failing static load is logged, not fatal; the hot-load
    /// orchestrator degrades on its own when dynamic loading is unavailable.
    pub async fn start(self) -> PluginResult<PluginSystem> {
        info!("Initializing plugin system");
        self.registry.seal();

        let manager = Arc::new(PluginManager::with_default_tx(self.default_tx));
        let adapter = Arc::new(RegistryLoader::new(self.registry.clone(), manager.clone()));

        if let Err(e) = adapter.load_all().await {
            error!(error = %e, "Loading static plugins failed");
        }

        let loader: Arc<dyn ArtifactLoader> = match self.loader {
            Some(factory) => factory(adapter.clone()),
            None => Arc::new(DynamicLoader::new(
                adapter.clone(),
                &self.config.compiled_path(),
            )),
        };
        let hotload = HotloadManager::new(self.config, loader);
        hotload.start().await?;

        let system = PluginSystem {
            registry: self.registry,
            manager,
            adapter,
            hotload,
        };
        system.log_inventory().await;
        info!("Plugin system initialized");
        Ok(system)
    }
}

/// The running plugin system.
#[derive(Debug)]
pub struct PluginSystem {
    registry: Arc<StaticRegistry>,
    manager: Arc<PluginManager>,
    adapter: Arc<RegistryLoader>,
    hotload: HotloadManager,
}

impl PluginSystem {
    /// Starts the setup phase.
    pub fn builder(config: PluginConfig) -> PluginSystemBuilder {
        PluginSystemBuilder {
            config,
            registry: Arc::new(StaticRegistry::new()),
            default_tx: TransactionHandle::detached(),
            loader: None,
        }
    }

    /// Returns the dispatch table.
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Returns the static registry.
    pub fn registry(&self) -> &Arc<StaticRegistry> {
        &self.registry
    }

    /// Returns the registry loader adapter.
    pub fn adapter(&self) -> &Arc<RegistryLoader> {
        &self.adapter
    }

    /// Returns the hot-load orchestrator.
    pub fn hotload(&self) -> &HotloadManager {
        &self.hotload
    }

    /// Returns the hot-load status.
    pub async fn status(&self) -> HotloadStatus {
        self.hotload.status().await
    }

    /// Stops the watcher. Registered behaviors stay in place.
    pub async fn shutdown(&self) {
        self.hotload.stop().await;
        info!("Plugin system stopped");
    }

    /// Logs every registered behavior grouped by hook point.
    pub async fn log_inventory(&self) {
        let all = self.manager.get_all_plugins().await;
        let mut total = 0;

        for (hook, behaviors) in &all {
            total += behaviors.len();
            info!(hook = %hook, count = behaviors.len(), "Hook point loaded");
            for meta in behaviors {
                debug!(
                    hook = %hook,
                    plugin = %meta.name,
                    version = %meta.version,
                    description = %meta.description,
                    enabled = meta.enabled,
                    priority = meta.priority,
                    "Behavior"
                );
            }
        }

        info!(total_plugins = total, hook_points = all.len(), "Plugin inventory");
    }
}
