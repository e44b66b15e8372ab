//! Dynamic loader: opens compiled artifacts and hands their registration
//! to the static registry (feature-gated).
//!
//! Platform loaders cache libraries by path, so every load first copies the
//! artifact to `{compiled}/.loaded/{identity}-{n}.{ext}` and opens the copy.
//! Opened libraries are never closed: a behavior created by an older
//! version may still be executing, and the code it points into must stay
//! mapped. Memory therefore grows with every reload until process exit.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Bookkeeping for one loaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedArtifact {
    /// Build unit identity the artifact was loaded for.
    pub identity: String,
    /// Identity the artifact registered under in the static registry.
    pub registered_as: String,
    /// The opened copy.
    pub path: std::path::PathBuf,
    /// Load generation.
    pub generation: u64,
    /// When the artifact was loaded.
    pub loaded_at: DateTime<Utc>,
}

/// Loads compiled artifacts into the running process.
#[async_trait]
pub trait ArtifactLoader: Send + Sync + std::fmt::Debug {
    /// Returns whether dynamic loading works on this host and build.
    fn is_supported(&self) -> bool;

    /// Loads an artifact for a unit identity.
    ///
    /// On failure the dispatch table is untouched and any previously loaded
    /// version stays active.
    async fn load(&self, identity: &str, artifact: &Path) -> PluginResult<()>;

    /// Loads a new artifact for an already loaded identity.
    ///
    /// The new behavior replaces the old one in a single dispatch-table
    /// write; if the load fails the old behavior stays active.
    async fn reload(&self, identity: &str, artifact: &Path) -> PluginResult<()> {
        if !self.is_loaded(identity).await {
            return Err(PluginError::UnknownIdentity(identity.to_string()));
        }
        self.load(identity, artifact).await
    }

    /// Disables the identity's behavior and drops its bookkeeping. The
    /// library stays mapped.
    async fn unload(&self, identity: &str) -> PluginResult<()>;

    /// Returns whether an artifact is loaded for the identity.
    async fn is_loaded(&self, identity: &str) -> bool;

    /// Returns every loaded artifact, sorted by identity.
    async fn loaded_plugins(&self) -> Vec<LoadedArtifact>;
}

#[cfg(feature = "dynamic")]
pub mod dynamic_loader {
    use std::collections::HashMap;
    use std::mem::ManuallyDrop;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use dashmap::DashMap;
    use tokio::sync::{Mutex, RwLock};
    use tracing::{error, info, warn};

    use super::{ArtifactLoader, LoadedArtifact};
    use crate::error::{PluginError, PluginResult};
    use crate::exports::PluginRegistration;
    use crate::ffi::abi::{self, ABI_VERSION, AbiVersionFn, RegisterFn};
    use crate::registry::RegistryLoader;

    /// Loads artifacts with `libloading`.
    pub struct DynamicLoader {
        /// Adapter that registers into the dispatch table.
        adapter: Arc<RegistryLoader>,
        /// Where generation copies are placed.
        staging_dir: PathBuf,
        /// Every library ever opened. Never dropped.
        libraries: Mutex<Vec<ManuallyDrop<libloading::Library>>>,
        /// Identity → bookkeeping.
        loaded: RwLock<HashMap<String, LoadedArtifact>>,
        /// Serializes loads per identity.
        locks: DashMap<String, Arc<Mutex<()>>>,
        /// Next generation number.
        next_generation: AtomicU64,
    }

    impl DynamicLoader {
        /// Creates a loader staging copies under `{compiled_dir}/.loaded`.
        pub fn new(adapter: Arc<RegistryLoader>, compiled_dir: &Path) -> Self {
            Self {
                adapter,
                staging_dir: compiled_dir.join(".loaded"),
                libraries: Mutex::new(Vec::new()),
                loaded: RwLock::new(HashMap::new()),
                locks: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }
        }

        fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
            self.locks
                .entry(identity.to_string())
                .or_default()
                .clone()
        }

        async fn stage(&self, identity: &str, artifact: &Path) -> PluginResult<(PathBuf, u64)> {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            tokio::fs::create_dir_all(&self.staging_dir).await?;
            let staged = self.staging_dir.join(format!(
                "{identity}-{generation}.{}",
                std::env::consts::DLL_EXTENSION
            ));
            tokio::fs::copy(artifact, &staged)
                .await
                .map_err(|e| PluginError::load_failed(identity, format!("staging copy: {e}")))?;
            Ok((staged, generation))
        }

        /// Opens the library and takes the registration it returns.
        fn open(
            identity: &str,
            path: &Path,
        ) -> PluginResult<(libloading::Library, PluginRegistration)> {
            // SAFETY: loading runs the library's initializers. Only artifacts
            // built by the compiler from the configured plugin root get here.
            let library = unsafe { libloading::Library::new(path) }
                .map_err(|e| PluginError::load_failed(identity, format!("open: {e}")))?;

            // SAFETY: the symbol type matches `export_plugin!`; a unit built
            // without the macro fails the lookup.
            let version = unsafe {
                let version_fn: libloading::Symbol<AbiVersionFn> =
                    library.get(abi::ABI_VERSION_SYMBOL).map_err(|e| {
                        PluginError::load_failed(
                            identity,
                            format!("missing symbol '{}': {e}", abi::symbol_name(abi::ABI_VERSION_SYMBOL)),
                        )
                    })?;
                version_fn()
            };
            if version != ABI_VERSION {
                return Err(PluginError::load_failed(
                    identity,
                    format!("ABI version {version}, host expects {ABI_VERSION}"),
                ));
            }

            // SAFETY: same ABI version, so the entry symbol returns a
            // `Box<PluginRegistration>` leaked with `Box::into_raw`.
            let registration = unsafe {
                let register_fn: libloading::Symbol<RegisterFn> =
                    library.get(abi::ENTRY_SYMBOL).map_err(|e| {
                        PluginError::load_failed(
                            identity,
                            format!("missing symbol '{}': {e}", abi::symbol_name(abi::ENTRY_SYMBOL)),
                        )
                    })?;
                let raw = register_fn();
                if raw.is_null() {
                    return Err(PluginError::load_failed(identity, "entry point returned null"));
                }
                *Box::from_raw(raw)
            };

            Ok((library, registration))
        }
    }

    #[async_trait]
    impl ArtifactLoader for DynamicLoader {
        fn is_supported(&self) -> bool {
            cfg!(any(unix, windows))
        }

        async fn load(&self, identity: &str, artifact: &Path) -> PluginResult<()> {
            let lock = self.lock_for(identity);
            let _guard = lock.lock().await;

            if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
                return Err(PluginError::load_failed(
                    identity,
                    format!("artifact not found: {}", artifact.display()),
                ));
            }

            let (staged, generation) = self.stage(identity, artifact).await?;
            let (library, registration) = match Self::open(identity, &staged) {
                Ok(opened) => opened,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&staged).await;
                    error!(plugin = %identity, error = %e, "Plugin load failed");
                    return Err(e);
                }
            };

            // From here on code from the library may be referenced; keep it mapped.
            self.libraries.lock().await.push(ManuallyDrop::new(library));

            let superseded = self
                .loaded
                .read()
                .await
                .get(identity)
                .map(|a| a.registered_as.clone());
            let registered_as = match self
                .adapter
                .activate_loaded(registration, superseded.as_deref())
                .await
            {
                Ok(registered_as) => registered_as,
                Err(e) => {
                    error!(plugin = %identity, error = %e, "Plugin registration failed, previous version kept");
                    return Err(PluginError::load_failed(identity, e.to_string()));
                }
            };

            let replaced = self
                .loaded
                .write()
                .await
                .insert(
                    identity.to_string(),
                    LoadedArtifact {
                        identity: identity.to_string(),
                        registered_as: registered_as.clone(),
                        path: staged.clone(),
                        generation,
                        loaded_at: Utc::now(),
                    },
                )
                .is_some();

            info!(
                plugin = %identity,
                registered_as = %registered_as,
                generation,
                path = %staged.display(),
                reload = replaced,
                "Plugin loaded"
            );
            Ok(())
        }

        async fn unload(&self, identity: &str) -> PluginResult<()> {
            let lock = self.lock_for(identity);
            let _guard = lock.lock().await;

            let artifact = self
                .loaded
                .write()
                .await
                .remove(identity)
                .ok_or_else(|| PluginError::UnknownIdentity(identity.to_string()))?;

            if let Err(e) = self.adapter.deactivate(&artifact.registered_as).await {
                warn!(plugin = %identity, error = %e, "Behavior already gone on unload");
            }
            info!(plugin = %identity, generation = artifact.generation, "Plugin unloaded, library stays resident");
            Ok(())
        }

        async fn is_loaded(&self, identity: &str) -> bool {
            self.loaded.read().await.contains_key(identity)
        }

        async fn loaded_plugins(&self) -> Vec<LoadedArtifact> {
            let loaded = self.loaded.read().await;
            let mut all: Vec<LoadedArtifact> = loaded.values().cloned().collect();
            all.sort_by(|a, b| a.identity.cmp(&b.identity));
            all
        }
    }

    impl std::fmt::Debug for DynamicLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DynamicLoader")
                .field("staging_dir", &self.staging_dir)
                .field(
                    "next_generation",
                    &self.next_generation.load(Ordering::Relaxed),
                )
                .finish()
        }
    }
}

/// Stub loader when the `dynamic` feature is not enabled.
#[cfg(not(feature = "dynamic"))]
pub mod dynamic_loader {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{ArtifactLoader, LoadedArtifact};
    use crate::error::{PluginError, PluginResult};
    use crate::registry::RegistryLoader;

    /// Stub dynamic loader; every load is unsupported.
    #[derive(Debug)]
    pub struct DynamicLoader;

    impl DynamicLoader {
        /// Creates a stub loader.
        pub fn new(_adapter: Arc<RegistryLoader>, _compiled_dir: &Path) -> Self {
            Self
        }
    }

    #[async_trait]
    impl ArtifactLoader for DynamicLoader {
        fn is_supported(&self) -> bool {
            false
        }

        async fn load(&self, identity: &str, _artifact: &Path) -> PluginResult<()> {
            Err(PluginError::Unsupported(format!(
                "cannot load '{identity}': built without the 'dynamic' feature"
            )))
        }

        async fn unload(&self, identity: &str) -> PluginResult<()> {
            Err(PluginError::UnknownIdentity(identity.to_string()))
        }

        async fn is_loaded(&self, _identity: &str) -> bool {
            false
        }

        async fn loaded_plugins(&self) -> Vec<LoadedArtifact> {
            Vec::new()
        }
    }
}

pub use dynamic_loader::DynamicLoader;
