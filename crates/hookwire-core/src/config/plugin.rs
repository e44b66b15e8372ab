//! Plugin system configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin system configuration: where extension sources live, where
/// artifacts go, and how the external toolchain is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Root directory holding one subdirectory per hot-loadable unit.
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: String,
    /// Directory receiving compiled artifacts.
    #[serde(default = "default_compiled_dir")]
    pub compiled_dir: String,
    /// Quiet period in milliseconds before a burst of file events triggers a rebuild.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Whether to watch the runtime directory after the initial scan.
    #[serde(default = "default_true")]
    pub enable_watch: bool,
    /// Whether the hot-load subsystem runs at all. `false` keeps only
    /// compiled-in plugins.
    #[serde(default = "default_true")]
    pub hotload: bool,
    /// File suffixes (without the dot) considered extension source.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
    /// External build program.
    #[serde(default = "default_toolchain")]
    pub toolchain: String,
    /// Build with the release profile.
    #[serde(default = "default_true")]
    pub release: bool,
    /// Additional arguments appended to the build command.
    #[serde(default)]
    pub extra_build_args: Vec<String>,
}

impl PluginConfig {
    /// Returns the runtime (source) root as a path.
    pub fn runtime_path(&self) -> PathBuf {
        PathBuf::from(&self.runtime_dir)
    }

    /// Returns the compiled artifact root as a path.
    pub fn compiled_path(&self) -> PathBuf {
        PathBuf::from(&self.compiled_dir)
    }

    /// Returns the debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            compiled_dir: default_compiled_dir(),
            debounce_ms: default_debounce_ms(),
            enable_watch: true,
            hotload: true,
            source_extensions: default_source_extensions(),
            toolchain: default_toolchain(),
            release: true,
            extra_build_args: Vec::new(),
        }
    }
}

fn default_runtime_dir() -> String {
    "plugins/runtime".to_string()
}

fn default_compiled_dir() -> String {
    "plugins/compiled".to_string()
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_source_extensions() -> Vec<String> {
    vec!["rs".to_string(), "toml".to_string()]
}

fn default_toolchain() -> String {
    "cargo".to_string()
}

fn default_true() -> bool {
    true
}
