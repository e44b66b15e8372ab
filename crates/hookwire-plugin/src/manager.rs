//! Plugin manager: the dispatch table consumed by the CRUD engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::PluginResult;
use crate::hooks::definitions::{BehaviorMetadata, EventRecord, HookKey, TransactionHandle};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::traits::Behavior;

/// Registers, toggles and executes behaviors per hook point.
#[derive(Debug)]
pub struct PluginManager {
    /// Hook registry.
    hook_registry: Arc<HookRegistry>,
    /// Hook dispatcher.
    hook_dispatcher: Arc<HookDispatcher>,
    /// Handle used when the event carries no transaction.
    default_tx: TransactionHandle,
}

impl PluginManager {
    /// Creates a new plugin manager with no default connection.
    pub fn new() -> Self {
        Self::with_default_tx(TransactionHandle::detached())
    }

    /// Creates a new plugin manager whose dispatches fall back to `default_tx`
    /// when the event carries no transaction.
    pub fn with_default_tx(default_tx: TransactionHandle) -> Self {
        let hook_registry = Arc::new(HookRegistry::new());
        let hook_dispatcher = Arc::new(HookDispatcher::new(hook_registry.clone()));

        Self {
            hook_registry,
            hook_dispatcher,
            default_tx,
        }
    }

    /// Registers a behavior at a hook point.
    pub async fn register(
        &self,
        hook: HookKey,
        behavior: Arc<dyn Behavior>,
        metadata: BehaviorMetadata,
    ) -> PluginResult<()> {
        self.hook_registry.register(hook, behavior, metadata).await
    }

    /// Atomically swaps a previous registration for a new one.
    pub async fn replace(
        &self,
        previous: Option<(&HookKey, &str)>,
        hook: HookKey,
        behavior: Arc<dyn Behavior>,
        metadata: BehaviorMetadata,
    ) -> PluginResult<()> {
        self.hook_registry
            .replace(previous, hook, behavior, metadata)
            .await
    }

    /// Unregisters a behavior from a hook point.
    pub async fn unregister(&self, hook: &HookKey, name: &str) -> PluginResult<()> {
        self.hook_registry.unregister(hook, name).await
    }

    /// Enables a behavior.
    pub async fn enable(&self, hook: &HookKey, name: &str) -> PluginResult<()> {
        self.hook_registry.set_enabled(hook, name, true).await
    }

    /// Disables a behavior; it stays listed but is skipped on dispatch.
    pub async fn disable(&self, hook: &HookKey, name: &str) -> PluginResult<()> {
        self.hook_registry.set_enabled(hook, name, false).await
    }

    /// Executes the event's hook point.
    ///
    /// Uses the transaction placed in the event under
    /// [`TX_KEY`](crate::hooks::TX_KEY), otherwise the manager's default.
    pub async fn execute(&self, token: &CancellationToken, event: &EventRecord) -> PluginResult<()> {
        let tx = event.transaction().unwrap_or(&self.default_tx);
        self.hook_dispatcher.execute(token, tx, event).await
    }

    /// Executes the event's hook point with an explicit transaction.
    pub async fn execute_with(
        &self,
        token: &CancellationToken,
        tx: &TransactionHandle,
        event: &EventRecord,
    ) -> PluginResult<()> {
        self.hook_dispatcher.execute(token, tx, event).await
    }

    /// Returns the behaviors at a hook point, in execution order.
    pub async fn get_plugins(&self, hook: &HookKey) -> Vec<BehaviorMetadata> {
        self.hook_registry.get_plugins(hook).await
    }

    /// Returns every registered behavior grouped by hook point.
    pub async fn get_all_plugins(&self) -> BTreeMap<HookKey, Vec<BehaviorMetadata>> {
        self.hook_registry.get_all_plugins().await
    }

    /// Lists hook points with at least one behavior, sorted.
    pub async fn list_hook_points(&self) -> Vec<HookKey> {
        self.hook_registry.list_hook_points().await
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.hook_dispatcher
    }

    /// Returns the hook registry.
    pub fn hook_registry(&self) -> &Arc<HookRegistry> {
        &self.hook_registry
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BehaviorError;
    use crate::hooks::definitions::{Action, Timing};
    use crate::traits::FnBehavior;

    fn tx_probe() -> Arc<dyn Behavior> {
        FnBehavior::new("tx_probe", |_, tx: TransactionHandle, _| async move {
            match tx.downcast_ref::<&'static str>() {
                Some(&"event-tx") => Ok(()),
                Some(other) => Err(BehaviorError::new(format!("wrong tx: {other}"))),
                None => Err(BehaviorError::new("detached")),
            }
        })
        .shared()
    }

    #[tokio::test]
    async fn test_execute_prefers_event_transaction() {
        let manager = PluginManager::with_default_tx(TransactionHandle::new("default-db"));
        let hook = HookKey::new("widget", Timing::Before, Action::Submit);
        manager
            .register(hook, tx_probe(), BehaviorMetadata::default())
            .await
            .unwrap();

        let token = CancellationToken::new();
        let plain = EventRecord::new("widget", Timing::Before, Action::Submit);
        assert!(manager.execute(&token, &plain).await.is_err());

        let in_tx = plain.with_transaction(TransactionHandle::new("event-tx"));
        manager.execute(&token, &in_tx).await.unwrap();
    }
}
