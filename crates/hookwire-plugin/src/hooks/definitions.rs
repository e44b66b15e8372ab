//! Hook point keys, behavior metadata, and the event record passed to behaviors.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// Reserved side-channel key under which callers running inside a
/// transaction place the transactional handle.
pub const TX_KEY: &str = "__tx";

/// Default priority for behaviors that do not declare one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// When a behavior runs relative to the record operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Before the operation is persisted. A failure blocks the operation.
    Before,
    /// After the operation is persisted.
    After,
}

impl Timing {
    /// Returns the key segment for this timing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timing {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(PluginError::InvalidHookKey(other.to_string())),
        }
    }
}

/// Record operation raised by the CRUD engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A record is created.
    Create,
    /// A record is updated.
    Update,
    /// A record is deleted.
    Delete,
    /// Records are queried.
    Query,
    /// A record is submitted for approval.
    Submit,
    /// A submitted record is withdrawn.
    Unsubmit,
}

impl Action {
    /// Returns the key segment for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::Submit => "submit",
            Self::Unsubmit => "unsubmit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "query" => Ok(Self::Query),
            "submit" => Ok(Self::Submit),
            "unsubmit" => Ok(Self::Unsubmit),
            other => Err(PluginError::InvalidHookKey(other.to_string())),
        }
    }
}

/// Hook point key: `{entity}.{timing}.{action}`.
///
/// Timing and action are closed enumerations; the entity is any
/// non-empty metadata table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HookKey {
    /// Target entity (table) name.
    pub entity: String,
    /// Before or after the operation.
    pub timing: Timing,
    /// The record operation.
    pub action: Action,
}

impl HookKey {
    /// Creates a hook key.
    pub fn new(entity: impl Into<String>, timing: Timing, action: Action) -> Self {
        Self {
            entity: entity.into(),
            timing,
            action,
        }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.entity, self.timing, self.action)
    }
}

impl FromStr for HookKey {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PluginError::InvalidHookKey(s.to_string());

        // Entity names may not contain dots, so split from the right.
        let mut parts = s.rsplitn(3, '.');
        let action = parts.next().ok_or_else(invalid)?;
        let timing = parts.next().ok_or_else(invalid)?;
        let entity = parts.next().ok_or_else(invalid)?;
        if entity.is_empty() || entity.contains('.') {
            return Err(invalid());
        }

        Ok(Self {
            entity: entity.to_string(),
            timing: timing.parse().map_err(|_| invalid())?,
            action: action.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for HookKey {
    type Error = PluginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HookKey> for String {
    fn from(key: HookKey) -> Self {
        key.to_string()
    }
}

/// Declared and registered metadata of a behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorMetadata {
    /// Behavior name. Empty means "use the behavior's own name".
    pub name: String,
    /// Description. Empty means "use the behavior's own description".
    pub description: String,
    /// Version. Empty means "use the behavior's own version".
    pub version: String,
    /// Author or maintainer.
    pub author: String,
    /// Whether the behavior runs when its hook point fires.
    pub enabled: bool,
    /// Execution priority (lower runs first, ties keep registration order).
    pub priority: i32,
    /// Hook point this behavior is attached to.
    pub hook: Option<HookKey>,
}

impl BehaviorMetadata {
    /// Creates enabled metadata with default priority and no hook point.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the hook point.
    pub fn at(mut self, hook: HookKey) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for BehaviorMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            version: String::new(),
            author: String::new(),
            enabled: true,
            priority: DEFAULT_PRIORITY,
            hook: None,
        }
    }
}

/// Opaque transactional handle shared by all behaviors of one dispatch.
///
/// The persistence layer is an external collaborator, so the handle is
/// type-erased; behaviors recover the concrete type with
/// [`downcast_ref`](Self::downcast_ref).
#[derive(Clone, Default)]
pub struct TransactionHandle(Option<Arc<dyn Any + Send + Sync>>);

impl TransactionHandle {
    /// Wraps a concrete transaction or connection.
    pub fn new<T: Any + Send + Sync>(tx: T) -> Self {
        Self(Some(Arc::new(tx)))
    }

    /// Wraps an already shared transaction or connection.
    pub fn from_arc(tx: Arc<dyn Any + Send + Sync>) -> Self {
        Self(Some(tx))
    }

    /// A handle carrying no transaction.
    pub fn detached() -> Self {
        Self(None)
    }

    /// Returns whether no transaction is attached.
    pub fn is_detached(&self) -> bool {
        self.0.is_none()
    }

    /// Borrows the attached transaction as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|tx| tx.downcast_ref::<T>())
    }

    /// Returns whether both handles point at the same transaction.
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("TransactionHandle(attached)"),
            None => f.write_str("TransactionHandle(detached)"),
        }
    }
}

/// A value in the event's side-channel mapping.
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// Plain JSON context.
    Value(serde_json::Value),
    /// The in-flight transaction, stored under [`TX_KEY`].
    Transaction(TransactionHandle),
}

/// Lifecycle event raised by the CRUD engine and handed to every behavior
/// of the matching hook point.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Target entity (table) name.
    pub entity: String,
    /// Record operation.
    pub action: Action,
    /// Before or after the operation.
    pub timing: Timing,
    /// Identifier of the affected record, if known.
    pub record_id: Option<u64>,
    /// Field name to value mapping.
    pub data: HashMap<String, serde_json::Value>,
    /// Acting user.
    pub user_id: u64,
    /// Acting tenant.
    pub tenant_id: u64,
    /// Open side-channel for extra context.
    pub extra: HashMap<String, ContextValue>,
}

impl EventRecord {
    /// Creates an event with empty data and context.
    pub fn new(entity: impl Into<String>, timing: Timing, action: Action) -> Self {
        Self {
            entity: entity.into(),
            action,
            timing,
            record_id: None,
            data: HashMap::new(),
            user_id: 0,
            tenant_id: 0,
            extra: HashMap::new(),
        }
    }

    /// Returns the hook point key this event dispatches to.
    pub fn hook_key(&self) -> HookKey {
        HookKey::new(self.entity.clone(), self.timing, self.action)
    }

    /// Sets the record identifier.
    pub fn with_record(mut self, record_id: u64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// Sets the acting user and tenant.
    pub fn with_actor(mut self, user_id: u64, tenant_id: u64) -> Self {
        self.user_id = user_id;
        self.tenant_id = tenant_id;
        self
    }

    /// Inserts a field value.
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Inserts a side-channel value.
    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra
            .insert(key.to_string(), ContextValue::Value(value));
        self
    }

    /// Places the in-flight transaction under [`TX_KEY`] so nested behaviors reuse it.
    pub fn with_transaction(mut self, tx: TransactionHandle) -> Self {
        self.extra
            .insert(TX_KEY.to_string(), ContextValue::Transaction(tx));
        self
    }

    /// Returns the transaction stored under [`TX_KEY`], if any.
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        match self.extra.get(TX_KEY) {
            Some(ContextValue::Transaction(tx)) => Some(tx),
            _ => None,
        }
    }

    /// Gets a field value.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string field value.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets a plain side-channel value.
    pub fn extra_value(&self, key: &str) -> Option<&serde_json::Value> {
        match self.extra.get(key) {
            Some(ContextValue::Value(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_key_parse_and_display() {
        let key: HookKey = "sys_table.after.create".parse().unwrap();
        assert_eq!(key.entity, "sys_table");
        assert_eq!(key.timing, Timing::After);
        assert_eq!(key.action, Action::Create);
        assert_eq!(key.to_string(), "sys_table.after.create");
    }

    #[test]
    fn test_hook_key_rejects_malformed() {
        assert!("widget.after".parse::<HookKey>().is_err());
        assert!("widget.during.create".parse::<HookKey>().is_err());
        assert!("widget.after.explode".parse::<HookKey>().is_err());
        assert!(".after.create".parse::<HookKey>().is_err());
        assert!("a.b.after.create".parse::<HookKey>().is_err());
    }

    #[test]
    fn test_hook_key_serde_as_string() {
        let key = HookKey::new("widget", Timing::Before, Action::Delete);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"widget.before.delete\"");
        let back: HookKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_event_hook_key() {
        let event = EventRecord::new("widget", Timing::After, Action::Update).with_record(7);
        assert_eq!(event.hook_key().to_string(), "widget.after.update");
        assert_eq!(event.record_id, Some(7));
    }

    #[test]
    fn test_transaction_side_channel() {
        #[derive(Debug, PartialEq)]
        struct FakeTx(u32);

        let tx = TransactionHandle::new(FakeTx(42));
        let event = EventRecord::new("widget", Timing::Before, Action::Create)
            .with_transaction(tx.clone())
            .with_extra("source", serde_json::json!("import"));

        let stored = event.transaction().unwrap();
        assert!(stored.same_as(&tx));
        assert_eq!(stored.downcast_ref::<FakeTx>(), Some(&FakeTx(42)));
        assert_eq!(
            event.extra_value("source"),
            Some(&serde_json::json!("import"))
        );
        assert!(event.extra_value(TX_KEY).is_none());
    }
}
