//! Sample hot-loadable unit.
//!
//! Edit this file while the server runs: the watcher picks up the change,
//! the unit is rebuilt and the new version replaces the old one at
//! `sys_user.after.create` without a restart.

use hookwire_plugin_sdk::prelude::*;

#[derive(Debug)]
struct ExampleHotload;

#[async_trait]
impl Behavior for ExampleHotload {
    fn name(&self) -> &str {
        "example_hotload"
    }

    fn description(&self) -> &str {
        "Logs newly created users"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn execute(
        &self,
        _token: &CancellationToken,
        _tx: &TransactionHandle,
        event: &EventRecord,
    ) -> Result<(), BehaviorError> {
        info!(
            table = %event.entity,
            action = %event.action,
            record = ?event.record_id,
            "Example hot-load plugin executed"
        );
        if let Some(username) = event.field_str("USERNAME") {
            info!(username, "New user created");
        }
        Ok(())
    }
}

export_plugin!(
    PluginRegistration::new("example_hotload", || Arc::new(ExampleHotload) as Arc<dyn Behavior>)
        .with_metadata(
            BehaviorMetadata::new("example_hotload")
                .at(hook_key!("sys_user.after.create"))
                .with_priority(50)
                .with_description("Logs newly created users")
                .with_version(env!("CARGO_PKG_VERSION"))
                .with_author("Hookwire Team"),
        )
);
