//! Hook system: keys, registry, and fail-fast dispatcher.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{
    Action, BehaviorMetadata, ContextValue, EventRecord, HookKey, TX_KEY, Timing,
    TransactionHandle,
};
pub use dispatcher::HookDispatcher;
pub use registry::{HookEntry, HookRegistry};
