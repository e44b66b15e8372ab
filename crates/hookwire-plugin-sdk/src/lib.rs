//! # hookwire-plugin-sdk
//!
//! SDK for developing Hookwire extension units, compiled-in or hot-loaded.
//!
//! ## Quick Start
//!
//! A hot-loadable unit is a `cdylib` crate under the plugin root that
//! depends on this SDK and exports its registration:
//!
//! ```rust,ignore
//! use hookwire_plugin_sdk::prelude::*;
//!
//! #[derive(Debug)]
//! struct AuditWidgets;
//!
//! #[async_trait]
//! impl Behavior for AuditWidgets {
//!     fn name(&self) -> &str {
//!         "audit_widgets"
//!     }
//!
//!     async fn execute(
//!         &self,
//!         _token: &CancellationToken,
//!         _tx: &TransactionHandle,
//!         event: &EventRecord,
//!     ) -> Result<(), BehaviorError> {
//!         info!(record = ?event.record_id, "Widget created");
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(
//!     PluginRegistration::new("audit_widgets", || Arc::new(AuditWidgets) as Arc<dyn Behavior>)
//!         .at(hook_key!("widget.after.create"))
//!         .with_priority(10)
//! );
//! ```
//!
//! The unit must be built with the same toolchain and the same SDK version
//! as the host; `export_plugin!` embeds an ABI version the loader checks.

pub use hookwire_plugin;
pub use hookwire_plugin::{event_record, export_plugin, hook_key};
pub use serde_json;
pub use tracing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use hookwire_plugin::prelude::*;
    pub use serde_json::{Value, json};
    pub use tracing::{debug, error, info, warn};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[derive(Debug)]
    struct Reject;

    #[async_trait]
    impl Behavior for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        async fn execute(
            &self,
            _token: &CancellationToken,
            _tx: &TransactionHandle,
            event: &EventRecord,
        ) -> Result<(), BehaviorError> {
            match event.field_str("STATUS") {
                Some("locked") => Err(BehaviorError::new("record is locked")),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_prelude_is_enough_to_write_a_behavior() {
        let registration =
            PluginRegistration::new("reject", || Arc::new(Reject) as Arc<dyn Behavior>)
                .at(hook_key!("widget.before.update"))
                .with_priority(5);
        assert_eq!(registration.metadata.priority, 5);

        let behavior = (registration.factory)();
        let token = CancellationToken::new();
        let tx = TransactionHandle::detached();
        let locked = event_record!("widget", Before, Update, {
            "STATUS" => json!("locked"),
        });
        assert!(behavior.execute(&token, &tx, &locked).await.is_err());

        let open = event_record!("widget", Before, Update);
        assert!(behavior.execute(&token, &tx, &open).await.is_ok());
    }
}
