//! Dispatch table behavior: ordering, conflicts, toggling, fail-fast chains.

use std::sync::{Arc, Mutex};

use hookwire_plugin::prelude::*;
use hookwire_plugin::{PluginError, PluginManager, StaticRegistry, RegistryLoader};

type CallLog = Arc<Mutex<Vec<String>>>;

fn recording(name: &str, log: &CallLog) -> Arc<dyn Behavior> {
    let log = log.clone();
    let label = name.to_string();
    FnBehavior::new(name, move |_, _, _| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.lock().unwrap().push(label);
            Ok(())
        }
    })
    .shared()
}

fn failing(name: &str, log: &CallLog) -> Arc<dyn Behavior> {
    let log = log.clone();
    let label = name.to_string();
    FnBehavior::new(name, move |_, _, _| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.lock().unwrap().push(label);
            Err(BehaviorError::new("MASK must not be empty"))
        }
    })
    .shared()
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn widget_create() -> HookKey {
    HookKey::new("widget", Timing::After, Action::Create)
}

fn widget_create_event() -> EventRecord {
    event_record!("widget", After, Create, {
        "NAME" => serde_json::json!("gear"),
    })
    .with_record(42)
    .with_actor(7, 1)
}

#[tokio::test]
async fn test_priority_then_registration_order() {
    let manager = PluginManager::new();
    let log = CallLog::default();

    manager
        .register(widget_create(), recording("B1", &log), BehaviorMetadata::new("B1").with_priority(5))
        .await
        .unwrap();
    manager
        .register(widget_create(), recording("B2", &log), BehaviorMetadata::new("B2").with_priority(1))
        .await
        .unwrap();
    manager
        .register(widget_create(), recording("B3", &log), BehaviorMetadata::new("B3").with_priority(5))
        .await
        .unwrap();

    manager
        .execute(&CancellationToken::new(), &widget_create_event())
        .await
        .unwrap();

    assert_eq!(calls(&log), vec!["B2", "B1", "B3"]);
    let listed: Vec<String> = manager
        .get_plugins(&widget_create())
        .await
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(listed, vec!["B2", "B1", "B3"]);
}

#[tokio::test]
async fn test_named_conflict_leaves_existing_untouched() {
    let manager = PluginManager::new();
    let log = CallLog::default();

    manager
        .register(
            widget_create(),
            recording("audit", &log),
            BehaviorMetadata::new("audit").with_priority(3).with_enabled(false),
        )
        .await
        .unwrap();

    let err = manager
        .register(
            widget_create(),
            recording("audit", &log),
            BehaviorMetadata::new("audit").with_priority(99),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::NamedConflict { ref name, .. } if name == "audit"));

    let plugins = manager.get_plugins(&widget_create()).await;
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].priority, 3);
    assert!(!plugins[0].enabled);
}

#[tokio::test]
async fn test_same_name_at_other_hook_point_is_allowed() {
    let manager = PluginManager::new();
    let log = CallLog::default();
    let update = HookKey::new("widget", Timing::After, Action::Update);

    manager
        .register(widget_create(), recording("audit", &log), BehaviorMetadata::new("audit"))
        .await
        .unwrap();
    manager
        .register(update.clone(), recording("audit", &log), BehaviorMetadata::new("audit"))
        .await
        .unwrap();

    assert_eq!(manager.list_hook_points().await, vec![widget_create(), update]);
}

#[tokio::test]
async fn test_disabled_behavior_is_skipped_but_listed() {
    let manager = PluginManager::new();
    let log = CallLog::default();

    for name in ["first", "second"] {
        manager
            .register(widget_create(), recording(name, &log), BehaviorMetadata::new(name))
            .await
            .unwrap();
    }
    manager.disable(&widget_create(), "first").await.unwrap();

    let token = CancellationToken::new();
    manager.execute(&token, &widget_create_event()).await.unwrap();
    assert_eq!(calls(&log), vec!["second"]);

    let plugins = manager.get_plugins(&widget_create()).await;
    assert_eq!(plugins.len(), 2);
    assert!(!plugins[0].enabled);
    assert_eq!(plugins[0].name, "first");

    manager.enable(&widget_create(), "first").await.unwrap();
    manager.execute(&token, &widget_create_event()).await.unwrap();
    assert_eq!(calls(&log), vec!["second", "first", "second"]);
}

#[tokio::test]
async fn test_toggle_unknown_fails() {
    let manager = PluginManager::new();
    let err = manager.enable(&widget_create(), "ghost").await.unwrap_err();
    assert!(matches!(err, PluginError::UnknownHookPoint(_)));
}

#[tokio::test]
async fn test_first_failure_aborts_chain() {
    let manager = PluginManager::new();
    let log = CallLog::default();
    let hook = HookKey::new("widget", Timing::Before, Action::Update);

    manager
        .register(hook.clone(), recording("B1", &log), BehaviorMetadata::new("B1").with_priority(1))
        .await
        .unwrap();
    manager
        .register(hook.clone(), failing("B2", &log), BehaviorMetadata::new("B2").with_priority(2))
        .await
        .unwrap();
    manager
        .register(hook.clone(), recording("B3", &log), BehaviorMetadata::new("B3").with_priority(3))
        .await
        .unwrap();

    let event = EventRecord::new("widget", Timing::Before, Action::Update);
    let err = manager
        .execute(&CancellationToken::new(), &event)
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::BehaviorFailed { ref name, .. } if name == "B2"));
    assert!(err.to_string().contains("MASK must not be empty"));
    assert_eq!(calls(&log), vec!["B1", "B2"]);
}

#[tokio::test]
async fn test_snapshot_is_independent_of_later_registration() {
    let manager = Arc::new(PluginManager::new());
    let log = CallLog::default();
    let gate = Arc::new(tokio::sync::Notify::new());
    let entered = Arc::new(tokio::sync::Notify::new());

    let slow = {
        let gate = gate.clone();
        let entered = entered.clone();
        FnBehavior::new("slow", move |_, _, _| {
            let gate = gate.clone();
            let entered = entered.clone();
            async move {
                entered.notify_one();
                gate.notified().await;
                Ok(())
            }
        })
        .shared()
    };
    manager
        .register(widget_create(), slow, BehaviorMetadata::new("slow").with_priority(1))
        .await
        .unwrap();

    let running = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .execute(&CancellationToken::new(), &widget_create_event())
                .await
        })
    };

    // Registration proceeds while the chain is mid-flight.
    entered.notified().await;
    manager
        .register(widget_create(), recording("late", &log), BehaviorMetadata::new("late").with_priority(2))
        .await
        .unwrap();
    gate.notify_one();

    running.await.unwrap().unwrap();
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn test_static_unit_end_to_end() {
    let log = CallLog::default();
    let registry = Arc::new(StaticRegistry::new());
    {
        let log = log.clone();
        registry
            .register(
                PluginRegistration::new("widget_audit", move || recording("widget_audit", &log))
                    .at(widget_create())
                    .with_priority(10),
            )
            .await
            .unwrap();
    }
    registry.seal();

    let manager = Arc::new(PluginManager::new());
    let loader = RegistryLoader::new(registry, manager.clone());
    loader.load_all().await.unwrap();

    let token = CancellationToken::new();
    manager.execute(&token, &widget_create_event()).await.unwrap();
    assert_eq!(calls(&log), vec!["widget_audit"]);

    manager.unregister(&widget_create(), "widget_audit").await.unwrap();
    manager.execute(&token, &widget_create_event()).await.unwrap();
    assert_eq!(calls(&log), vec!["widget_audit"]);
}
