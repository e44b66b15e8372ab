//! Hot-load orchestrator: initial scan, compile and load, then rebuild on change.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hookwire_core::config::PluginConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::compiler::{CompileResult, PluginCompiler};
use super::loader::ArtifactLoader;
use super::watcher::{ChangeEvent, ChangeHandler, ChangeKind, PluginWatcher};
use crate::error::{PluginError, PluginResult};

/// Build state of one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildUnit {
    /// Unit name (subdirectory of the plugin root).
    pub name: String,
    /// Digest of the last build that was loaded.
    pub last_digest: Option<String>,
    /// Outcome of the last build attempt.
    pub last_result: Option<CompileResult>,
}

/// Read-only orchestrator status for dashboards and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotloadStatus {
    /// Whether `start` has completed.
    pub started: bool,
    /// Whether only compiled-in plugins are available.
    pub static_only: bool,
    /// Whether the watcher is running.
    pub watcher_active: bool,
    /// Identities of loaded artifacts.
    pub loaded_plugins: Vec<String>,
    /// Per-unit build state, sorted by name.
    pub units: Vec<BuildUnit>,
}

/// Outcome of a scan of the plugin root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Units compiled and loaded.
    pub loaded: Vec<String>,
    /// Units already loaded with unchanged source.
    pub unchanged: Vec<String>,
    /// Units whose compile or load failed.
    pub failed: Vec<String>,
}

/// Lists build units under a plugin root: subdirectories not starting
/// with `.` or `_`, sorted.
pub fn discover_units(root: &Path) -> std::io::Result<Vec<String>> {
    let mut units = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || name.starts_with('_') {
            debug!(dir = %name, "Skipping hidden directory");
            continue;
        }
        units.push(name);
    }
    units.sort();
    Ok(units)
}

/// State shared with the watcher's change handler.
#[derive(Debug)]
struct Inner {
    config: PluginConfig,
    compiler: PluginCompiler,
    loader: Arc<dyn ArtifactLoader>,
    units: RwLock<HashMap<String, BuildUnit>>,
    /// Serializes compile→load per unit.
    unit_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Inner {
    /// Compiles and loads one unit. Failures leave the previous version active.
    async fn rebuild(&self, unit: &str) -> PluginResult<CompileResult> {
        let lock = self
            .unit_locks
            .entry(unit.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let result = self.compiler.compile(unit).await;
        self.record(unit, &result, false).await;

        let Some(artifact) = result.artifact_path.clone().filter(|_| result.success) else {
            return Err(PluginError::BuildFailed {
                unit: unit.to_string(),
                diagnostics: result.error.clone().unwrap_or_default(),
            });
        };

        if self.loader.is_loaded(unit).await {
            self.loader.reload(unit, &artifact).await?;
        } else {
            self.loader.load(unit, &artifact).await?;
        }
        self.record(unit, &result, true).await;
        Ok(result)
    }

    /// Stores the last build outcome. The digest only advances once the
    /// artifact is loaded.
    async fn record(&self, unit: &str, result: &CompileResult, loaded: bool) {
        let mut units = self.units.write().await;
        let state = units.entry(unit.to_string()).or_insert_with(|| BuildUnit {
            name: unit.to_string(),
            ..BuildUnit::default()
        });
        state.last_result = Some(result.clone());
        if loaded {
            state.last_digest = result.digest.clone();
        }
    }

    /// Returns whether the unit is loaded and its source unchanged.
    async fn is_current(&self, unit: &str) -> bool {
        if !self.loader.is_loaded(unit).await {
            return false;
        }
        let last = self
            .units
            .read()
            .await
            .get(unit)
            .and_then(|u| u.last_digest.clone());
        last.is_some() && !self.compiler.needs_rebuild(unit, last.as_deref()).await
    }

    async fn scan(&self) -> PluginResult<ScanSummary> {
        let root = self.config.runtime_path();
        info!(dir = %root.display(), "Scanning plugin directory");

        if !root.is_dir() {
            warn!(dir = %root.display(), "Plugin directory missing, nothing to load");
            return Ok(ScanSummary::default());
        }

        let mut summary = ScanSummary::default();
        for unit in discover_units(&root)? {
            if self.is_current(&unit).await {
                debug!(plugin = %unit, "Source unchanged, skipping");
                summary.unchanged.push(unit);
                continue;
            }

            info!(plugin = %unit, "Plugin discovered");
            match self.rebuild(&unit).await {
                Ok(_) => summary.loaded.push(unit),
                Err(e) => {
                    error!(plugin = %unit, error = %e, "Plugin load failed, skipping");
                    summary.failed.push(unit);
                }
            }
        }

        info!(
            loaded = summary.loaded.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failed.len(),
            "Plugin scan complete"
        );
        Ok(summary)
    }

    async fn handle_change(&self, event: ChangeEvent) {
        let unit = event.unit.as_str();

        if event.kind == ChangeKind::Remove && !self.compiler.unit_dir(unit).exists() {
            info!(plugin = %unit, "Plugin source removed, unloading");
            if let Err(e) = self.loader.unload(unit).await {
                debug!(plugin = %unit, error = %e, "Nothing to unload");
            }
            if let Err(e) = self.compiler.clean(unit).await {
                warn!(plugin = %unit, error = %e, "Failed to remove artifact");
            }
            self.units.write().await.remove(unit);
            return;
        }

        if self.is_current(unit).await {
            debug!(plugin = %unit, "Source unchanged, skipping rebuild");
            return;
        }

        match self.rebuild(unit).await {
            Ok(result) => info!(
                plugin = %unit,
                duration_ms = result.duration_ms,
                "Plugin hot reloaded"
            ),
            Err(e) => error!(
                plugin = %unit,
                error = %e,
                "Plugin reload failed, previous version stays active"
            ),
        }
    }
}

/// Routes watcher events to the orchestrator.
struct RebuildOnChange {
    inner: Arc<Inner>,
}

#[async_trait]
impl ChangeHandler for RebuildOnChange {
    async fn on_change(&self, event: ChangeEvent) {
        self.inner.handle_change(event).await;
    }
}

/// Lifecycle flags.
#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    static_only: bool,
}

/// Drives the build pipeline, the dynamic loader and the watcher.
#[derive(Debug)]
pub struct HotloadManager {
    inner: Arc<Inner>,
    watcher: Option<PluginWatcher>,
    lifecycle: Mutex<Lifecycle>,
}

impl HotloadManager {
    /// Creates an orchestrator. The watcher is only built when
    /// `enable_watch` is set.
    pub fn new(config: PluginConfig, loader: Arc<dyn ArtifactLoader>) -> Self {
        let inner = Arc::new(Inner {
            compiler: PluginCompiler::new(&config),
            config,
            loader,
            units: RwLock::new(HashMap::new()),
            unit_locks: DashMap::new(),
        });

        let watcher = inner.config.enable_watch.then(|| {
            PluginWatcher::new(
                inner.config.runtime_path(),
                inner.config.debounce(),
                inner.config.source_extensions.clone(),
                Arc::new(RebuildOnChange {
                    inner: Arc::clone(&inner),
                }),
            )
        });

        Self {
            inner,
            watcher,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Scans, compiles and loads every unit, then starts the watcher.
    ///
    /// Idempotent. When dynamic loading is unavailable, or `hotload` is off,
    /// logs the degradation and keeps only compiled-in plugins.
    pub async fn start(&self) -> PluginResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.started {
            return Ok(());
        }

        if !self.inner.config.hotload {
            info!("Hot-load disabled by configuration, static plugins only");
            lifecycle.static_only = true;
            lifecycle.started = true;
            return Ok(());
        }
        if !self.inner.loader.is_supported() {
            warn!(
                os = std::env::consts::OS,
                "Dynamic loading unavailable on this host or build, static plugins only"
            );
            lifecycle.static_only = true;
            lifecycle.started = true;
            return Ok(());
        }

        info!("Starting hot-load manager");
        let root = self.inner.config.runtime_path();
        if let Err(e) = tokio::fs::create_dir_all(&root).await {
            warn!(dir = %root.display(), error = %e, "Cannot create plugin directory");
        }

        if let Err(e) = self.inner.scan().await {
            error!(error = %e, "Plugin scan failed");
        }

        if let Some(watcher) = &self.watcher {
            if let Err(e) = watcher.start().await {
                error!(error = %e, "Plugin watcher failed to start");
            }
        }

        lifecycle.started = true;
        info!("Hot-load manager started");
        Ok(())
    }

    /// Stops the watcher. Loaded plugins stay registered.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.started {
            return;
        }
        if let Some(watcher) = &self.watcher {
            watcher.stop().await;
        }
        lifecycle.started = false;
        info!("Hot-load manager stopped");
    }

    /// Re-scans the plugin root, rebuilding changed or unloaded units.
    pub async fn scan(&self) -> PluginResult<ScanSummary> {
        self.inner.scan().await
    }

    /// Compiles and loads one unit.
    pub async fn rebuild(&self, unit: &str) -> PluginResult<CompileResult> {
        self.inner.rebuild(unit).await
    }

    /// Unloads a unit's artifact.
    pub async fn unload(&self, unit: &str) -> PluginResult<()> {
        self.inner.loader.unload(unit).await
    }

    /// Handles one change event as the watcher would.
    pub async fn handle_change(&self, event: ChangeEvent) {
        self.inner.handle_change(event).await;
    }

    /// Returns the identities of loaded artifacts.
    pub async fn loaded_plugins(&self) -> Vec<String> {
        self.inner
            .loader
            .loaded_plugins()
            .await
            .into_iter()
            .map(|a| a.identity)
            .collect()
    }

    /// Returns the current status.
    pub async fn status(&self) -> HotloadStatus {
        let (started, static_only) = {
            let lifecycle = self.lifecycle.lock().await;
            (lifecycle.started, lifecycle.static_only)
        };
        let watcher_active = match &self.watcher {
            Some(watcher) => watcher.is_active().await,
            None => false,
        };
        let mut units: Vec<BuildUnit> = self.inner.units.read().await.values().cloned().collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));

        HotloadStatus {
            started,
            static_only,
            watcher_active,
            loaded_plugins: self.loaded_plugins().await,
            units,
        }
    }

    /// Returns the build pipeline.
    pub fn compiler(&self) -> &PluginCompiler {
        &self.inner.compiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_units_skips_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["orders", ".git", "_template", "billing"] {
            std::fs::create_dir(tmp.path().join(dir)).unwrap();
        }
        std::fs::write(tmp.path().join("README.md"), "x").unwrap();

        assert_eq!(
            discover_units(tmp.path()).unwrap(),
            vec!["billing".to_string(), "orders".to_string()]
        );
    }
}
