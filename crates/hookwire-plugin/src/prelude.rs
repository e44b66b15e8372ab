//! Prelude for convenient imports.

pub use std::sync::Arc;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

pub use crate::error::BehaviorError;
pub use crate::exports::PluginRegistration;
pub use crate::hooks::definitions::{
    Action, BehaviorMetadata, EventRecord, HookKey, Timing, TransactionHandle,
};
pub use crate::traits::{Behavior, FnBehavior};

pub use crate::{event_record, export_plugin, hook_key};
