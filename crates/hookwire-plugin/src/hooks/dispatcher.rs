//! Hook dispatcher: runs the behaviors of one hook point as a fail-fast chain.
//!
//! - The ordered list is copied under the registry's read lock, and the lock
//!   is released before any behavior runs.
//! - Behaviors run sequentially in (priority, registration) order; disabled
//!   ones are skipped.
//! - The first failure stops the chain and is returned wrapped with the
//!   failing behavior's name. Later behaviors do not run.
//! - There is no per-behavior timeout; the cancellation token is the only
//!   signal, and behaviors are expected to observe it.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::definitions::{EventRecord, TransactionHandle};
use super::registry::HookRegistry;
use crate::error::{PluginError, PluginResult};

/// Dispatches events to the behaviors registered at their hook point.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self { registry }
    }

    /// Executes every enabled behavior at the event's hook point.
    ///
    /// An empty hook point is a trivial success.
    pub async fn execute(
        &self,
        token: &CancellationToken,
        tx: &TransactionHandle,
        event: &EventRecord,
    ) -> PluginResult<()> {
        let hook = event.hook_key();
        let chain = self.registry.snapshot(&hook).await;

        if chain.is_empty() {
            return Ok(());
        }

        debug!(
            hook = %hook,
            behavior_count = chain.len(),
            record_id = ?event.record_id,
            "Dispatching hook"
        );

        for entry in chain.iter().filter(|e| e.is_enabled()) {
            let started = Instant::now();
            if let Err(source) = entry.behavior.execute(token, tx, event).await {
                warn!(
                    hook = %hook,
                    plugin = %entry.name(),
                    error = %source,
                    "Behavior failed, chain aborted"
                );
                return Err(PluginError::BehaviorFailed {
                    name: entry.name().to_string(),
                    source,
                });
            }
            debug!(
                hook = %hook,
                plugin = %entry.name(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Behavior completed"
            );
        }

        Ok(())
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}
