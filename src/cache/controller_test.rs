use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing_test::traced_test;

use super::*;
use crate::hub;
use crate::test_utils::capture;
use crate::test_utils::drain;
use crate::test_utils::machine;
use crate::test_utils::model_change;
use crate::test_utils::test_controller;
use crate::test_utils::unit;
use crate::test_utils::MODEL_UUID;
use crate::CacheError;
use crate::Error;
use crate::StreamConfig;
use crate::StreamError;
use crate::WatcherError;

fn model_removal() -> RemovalMessage {
    RemovalMessage::Model {
        model_uuid: MODEL_UUID.to_string(),
    }
}

#[test]
#[traced_test]
fn first_change_creates_model_lazily() {
    let controller = test_controller();
    assert!(controller.model_cache(MODEL_UUID).is_none());

    controller.apply_change(unit("mysql/0", "0")).unwrap();

    let model = controller.model_cache(MODEL_UUID).expect("model created");
    assert!(model.unit("mysql/0").is_some());
    // Not populated until the model's own change arrives.
    assert!(controller.model(MODEL_UUID).is_none());
    assert!(logs_contain("Model added to cache"));
}

#[test]
fn change_without_model_uuid_is_malformed() {
    let controller = test_controller();
    let change = EntityChange::Unit(UnitChange {
        name: "mysql/0".to_string(),
        ..Default::default()
    });

    let result = controller.apply_change(change);

    assert!(matches!(
        result,
        Err(Error::Cache(CacheError::MalformedChange { kind: EntityKind::Unit, .. }))
    ));
    assert!(controller.models().is_empty());
}

#[test]
fn removal_of_absent_entity_is_not_found() {
    let controller = test_controller();
    assert!(!controller.apply_removal(RemovalMessage::Unit {
        model_uuid: MODEL_UUID.to_string(),
        name: "mysql/0".to_string(),
    }));
    assert!(!controller.apply_removal(model_removal()));
    assert!(controller.apply(ChangeEvent::Removal(model_removal())).is_ok());
}

#[test]
fn model_removal_retires_everything() {
    let controller = test_controller();
    let (_sub, model_rx) = capture(controller.hub(), hub::MODEL_REMOVE);
    controller.apply_change(EntityChange::Model(model_change("prod"))).unwrap();
    controller.apply_change(machine("0")).unwrap();
    controller.apply_change(unit("mysql/0", "0")).unwrap();
    let unit_watch = controller.model_cache(MODEL_UUID).unwrap().watch_unit("mysql/0").unwrap();

    assert!(controller.apply_removal(model_removal()));

    assert!(controller.model_cache(MODEL_UUID).is_none());
    assert_eq!(unit_watch.err(), Some(WatcherError::closed("entity removed")));
    assert_eq!(drain(&model_rx).len(), 1);
}

#[test]
fn model_reappears_after_removal() {
    let controller = test_controller();
    controller.apply_change(EntityChange::Model(model_change("prod"))).unwrap();
    let first = controller.model_cache(MODEL_UUID).unwrap();
    controller.apply_removal(model_removal());

    controller.apply_change(EntityChange::Model(model_change("prod-2"))).unwrap();

    let second = controller.model_cache(MODEL_UUID).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(controller.model(MODEL_UUID).unwrap().name(), "prod-2");
}

#[test]
fn models_are_listed_by_uuid() {
    let controller = test_controller();
    for uuid in ["c-model", "a-model", "b-model"] {
        controller
            .apply_change(EntityChange::Model(ModelChange {
                model_uuid: uuid.to_string(),
                name: uuid.to_string(),
                ..Default::default()
            }))
            .unwrap();
    }

    let uuids: Vec<String> = controller.models().iter().map(|m| m.model_uuid().to_string()).collect();
    assert_eq!(uuids, vec!["a-model", "b-model", "c-model"]);
}

#[test]
fn sweep_after_resync_evicts_what_was_not_refreshed() {
    let controller = test_controller();
    controller
        .apply_change(EntityChange::Model(ModelChange {
            model_uuid: "gone-model".to_string(),
            ..Default::default()
        }))
        .unwrap();
    controller.apply_change(EntityChange::Model(model_change("prod"))).unwrap();
    controller.apply_change(unit("mysql/0", "0")).unwrap();
    controller.apply_change(unit("mysql/1", "1")).unwrap();

    controller.mark_stale();
    controller.apply_change(EntityChange::Model(model_change("prod"))).unwrap();
    controller.apply_change(unit("mysql/0", "0")).unwrap();

    // The whole "gone-model" plus one unit.
    assert_eq!(controller.sweep(), 2);
    assert!(controller.model_cache("gone-model").is_none());
    let model = controller.model_cache(MODEL_UUID).unwrap();
    assert!(model.unit("mysql/0").is_some());
    assert!(model.unit("mysql/1").is_none());
}

#[tokio::test]
async fn watch_model_signals_on_model_changes() {
    let controller = test_controller();
    assert!(controller.watch_model(MODEL_UUID).is_none());
    controller.apply_change(EntityChange::Model(model_change("prod"))).unwrap();

    let notifier = controller.watch_model(MODEL_UUID).unwrap();
    let mut armed = notifier.arm().unwrap();
    assert_eq!(armed.poll(), Ok(false));

    controller.apply_change(EntityChange::Model(model_change("renamed"))).unwrap();

    assert_eq!(armed.poll(), Ok(true));
    assert_eq!(armed.poll(), Ok(false));
}

#[tokio::test]
async fn run_applies_events_until_shutdown() {
    let controller = Arc::new(test_controller());
    let (changes, feed) = change_feed(&StreamConfig::default());
    let (shutdown_tx, shutdown) = watch::channel(());

    let handle = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.run(feed, shutdown).await }
    });

    changes.send(unit("mysql/0", "0").into()).await.unwrap();
    // Malformed: logged and skipped.
    changes
        .send(ChangeEvent::Change(EntityChange::Machine(MachineChange::default())))
        .await
        .unwrap();
    changes.send(machine("0").into()).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while controller.model_cache(MODEL_UUID).and_then(|m| m.machine("0")).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events applied");

    shutdown_tx.send(()).unwrap();
    let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(controller.model_cache(MODEL_UUID).unwrap().unit("mysql/0").is_some());
    assert_eq!(controller.models().len(), 0);
    assert_eq!(controller.model_cache(MODEL_UUID).unwrap().resident_count(), 3);
}

#[tokio::test]
async fn run_reports_terminated_feed() {
    let controller = test_controller();
    let (changes, feed) = change_feed(&StreamConfig::default());
    let (_shutdown_tx, shutdown) = watch::channel(());
    drop(changes);

    let result = controller.run(feed, shutdown).await;

    assert!(matches!(result, Err(Error::Stream(StreamError::Terminated))));
}

#[tokio::test]
async fn run_applies_removals() {
    let controller = Arc::new(test_controller());
    controller.apply_change(unit("mysql/0", "0")).unwrap();
    let (changes, feed) = change_feed(&StreamConfig::default());
    let (_shutdown_tx, shutdown) = watch::channel(());

    changes
        .send(ChangeEvent::Removal(RemovalMessage::Unit {
            model_uuid: MODEL_UUID.to_string(),
            name: "mysql/0".to_string(),
        }))
        .await
        .unwrap();
    drop(changes);

    let result = controller.run(feed, shutdown).await;

    // The feed closed after the removal was applied.
    assert!(matches!(result, Err(Error::Stream(StreamError::Terminated))));
    assert!(controller.model_cache(MODEL_UUID).unwrap().unit("mysql/0").is_none());
}
