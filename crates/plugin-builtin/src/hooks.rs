//! Behaviors for the system table catalog.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hookwire_plugin::error::BehaviorError;
use hookwire_plugin::hooks::definitions::{EventRecord, TransactionHandle};
use hookwire_plugin::traits::Behavior;

/// Field marking a catalog row as owned by the system.
pub const IS_SYSTEM_FIELD: &str = "IS_SYSTEM";

/// Field holding the catalog row's table name.
pub const TABLE_NAME_FIELD: &str = "TABLE_NAME";

/// Logs every table created in the catalog.
#[derive(Debug, Default)]
pub struct SysTableAuditHook;

#[async_trait]
impl Behavior for SysTableAuditHook {
    fn name(&self) -> &str {
        "sys_table_audit"
    }

    fn description(&self) -> &str {
        "Logs tables added to the catalog"
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
        tracing::info!(
            entity = %event.entity,
            record = ?event.record_id,
            table = event.field_str(TABLE_NAME_FIELD).unwrap_or("<unnamed>"),
            user = event.user_id,
            tenant = event.tenant_id,
            "Catalog table created"
        );
        Ok(())
    }
}

/// Rejects deletion of system-owned catalog rows.
#[derive(Debug, Default)]
pub struct SysTableDeleteGuardHook;

#[async_trait]
impl Behavior for SysTableDeleteGuardHook {
    fn name(&self) -> &str {
        "sys_table_delete_guard"
    }

    fn description(&self) -> &str {
        "Prevents deleting system tables"
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
        if event.field_str(IS_SYSTEM_FIELD) == Some("Y") {
            let table = event.field_str(TABLE_NAME_FIELD).unwrap_or("<unnamed>");
            tracing::warn!(
                record = ?event.record_id,
                table = table,
                user = event.user_id,
                "Blocked deletion of system table"
            );
            return Err(BehaviorError::new(format!(
                "system table '{table}' cannot be deleted"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwire_plugin::hooks::definitions::{Action, Timing};
    use serde_json::json;

    fn delete_event(is_system: &str) -> EventRecord {
        EventRecord::new("sys_table", Timing::Before, Action::Delete)
            .with_record(3)
            .with_field(TABLE_NAME_FIELD, json!("sys_user"))
            .with_field(IS_SYSTEM_FIELD, json!(is_system))
    }

    #[tokio::test]
    async fn test_guard_rejects_system_rows() {
        let guard = SysTableDeleteGuardHook;
        let err = guard
            .execute(
                &CancellationToken::new(),
                &TransactionHandle::detached(),
                &delete_event("Y"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.message, "system table 'sys_user' cannot be deleted");
    }

    #[tokio::test]
    async fn test_guard_allows_user_rows() {
        let guard = SysTableDeleteGuardHook;
        let token = CancellationToken::new();
        let tx = TransactionHandle::detached();
        assert!(guard.execute(&token, &tx, &delete_event("N")).await.is_ok());

        let unmarked = EventRecord::new("sys_table", Timing::Before, Action::Delete);
        assert!(guard.execute(&token, &tx, &unmarked).await.is_ok());
    }
}
