//! # hookwire-plugin
//!
//! Extension runtime for Hookwire. Provides:
//!
//! - Hook point keys and the event record handed to behaviors
//! - A per-hook-point dispatch table with priority ordering and fail-fast execution
//! - A static registry for compiled-in behaviors and its loader adapter
//! - Hot loading: source digest, toolchain build, `libloading`-based loader
//!   (feature `dynamic`), debounced filesystem watcher and orchestrator
//! - The entry-point ABI and `export_plugin!` macro for loadable units

pub mod error;
pub mod exports;
pub mod ffi;
pub mod hooks;
pub mod hotload;
pub mod macros;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod setup;
pub mod traits;

pub use error::{BehaviorError, PluginError, PluginResult};
pub use exports::{BehaviorFactory, PluginRegistration};
pub use hooks::definitions::{
    Action, BehaviorMetadata, ContextValue, EventRecord, HookKey, TX_KEY, Timing,
    TransactionHandle,
};
pub use hooks::dispatcher::HookDispatcher;
pub use hooks::registry::HookRegistry;
pub use hotload::{HotloadManager, HotloadStatus};
pub use manager::PluginManager;
pub use registry::{RegistryLoader, StaticRegistry};
pub use setup::{PluginSystem, PluginSystemBuilder};
pub use traits::{Behavior, FnBehavior};
