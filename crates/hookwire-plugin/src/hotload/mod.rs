//! Hot-load subsystem: digest, build pipeline, dynamic loader, watcher,
//! and the orchestrator tying them together.

pub mod compiler;
pub mod digest;
pub mod loader;
pub mod manager;
pub mod watcher;

pub use compiler::{CompileResult, PluginCompiler};
pub use loader::{ArtifactLoader, DynamicLoader, LoadedArtifact};
pub use manager::{BuildUnit, HotloadManager, HotloadStatus, ScanSummary, discover_units};
pub use watcher::{ChangeEvent, ChangeHandler, ChangeKind, PluginWatcher};
