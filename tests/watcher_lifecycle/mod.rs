//! Watcher Lifecycle Tests
//!
//! Tests for watchers handed out through the facade and registry:
//! - First-event protocol (no spurious first poll)
//! - Exactly one change reported after an update
//! - Teardown on entity removal and on release

use std::sync::Arc;
use std::thread;

use fleet_cache::EntityWatchFacade;
use fleet_cache::MachineChange;
use fleet_cache::RemovalMessage;
use fleet_cache::WatcherConfig;
use fleet_cache::WatcherError;
use fleet_cache::WatcherRegistry;
use tracing_test::traced_test;

use crate::common::apply_machine;
use crate::common::controller;
use crate::common::machine;
use crate::common::StaticAuthorizer;
use crate::common::MODEL_UUID;

fn facade(
    controller: &Arc<fleet_cache::Controller>,
    registry: &Arc<WatcherRegistry>,
    owned: &[&str],
) -> EntityWatchFacade {
    let authorizer = StaticAuthorizer {
        owned: owned.iter().map(|tag| tag.to_string()).collect(),
    };
    EntityWatchFacade::new(
        Arc::clone(controller),
        Arc::clone(registry),
        Arc::new(authorizer),
        MODEL_UUID,
    )
    .unwrap()
}

/// Test: watch, arm, then one unrelated attribute update → exactly one change
#[test]
#[traced_test]
fn armed_watch_reports_exactly_one_change() {
    let controller = controller();
    let registry = Arc::new(WatcherRegistry::new(WatcherConfig::default()));
    apply_machine(&controller, machine("0"));
    let facade = facade(&controller, &registry, &["machine-0"]);

    let results = facade.watch_machines(&["machine-0"]).unwrap();
    let id = results[0].watcher_id.clone().expect("registered");

    assert_eq!(registry.poll(&id), Ok(false));

    apply_machine(
        &controller,
        MachineChange {
            addresses: vec!["10.0.0.4".to_string()],
            ..machine("0")
        },
    );

    assert_eq!(registry.poll(&id), Ok(true));
    assert_eq!(registry.poll(&id), Ok(false));
}

/// Test: a watcher on a removed machine reports removal, then is released
#[test]
fn removal_closes_registered_watchers() {
    let controller = controller();
    let registry = Arc::new(WatcherRegistry::new(WatcherConfig::default()));
    apply_machine(&controller, machine("0"));
    let facade = facade(&controller, &registry, &["machine-0"]);
    let results = facade.watch_machines(&["machine-0", "machine-0"]).unwrap();

    controller.apply_removal(RemovalMessage::Machine {
        model_uuid: MODEL_UUID.to_string(),
        id: "0".to_string(),
    });

    for result in &results {
        let id = result.watcher_id.as_deref().unwrap();
        assert_eq!(
            registry.poll(id),
            Err(WatcherError::Closed {
                reason: "entity removed".to_string()
            })
        );
    }
    assert_eq!(registry.release_all(), 2);
}

/// Test: a machine re-created after removal gets fresh watchers
#[test]
fn recreated_machine_is_watchable_again() {
    let controller = controller();
    let registry = Arc::new(WatcherRegistry::new(WatcherConfig::default()));
    apply_machine(&controller, machine("0"));
    let facade = facade(&controller, &registry, &["machine-0"]);
    let old = facade.watch_machines(&["machine-0"]).unwrap()[0].watcher_id.clone().unwrap();

    controller.apply_removal(RemovalMessage::Machine {
        model_uuid: MODEL_UUID.to_string(),
        id: "0".to_string(),
    });
    apply_machine(&controller, machine("0"));
    let new = facade.watch_machines(&["machine-0"]).unwrap()[0].watcher_id.clone().unwrap();

    assert!(registry.poll(&old).is_err());
    assert_eq!(registry.poll(&new), Ok(false));
}

/// Test: concurrent updates, removals and watches never leak a watcher
#[test]
fn concurrent_watch_and_removal_never_leak() {
    let controller = controller();
    let registry = Arc::new(WatcherRegistry::new(WatcherConfig::default()));
    apply_machine(&controller, machine("0"));
    let facade = Arc::new(facade(&controller, &registry, &["machine-0"]));

    let churn = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            for _ in 0..200 {
                controller.apply_removal(RemovalMessage::Machine {
                    model_uuid: MODEL_UUID.to_string(),
                    id: "0".to_string(),
                });
                apply_machine(&controller, machine("0"));
            }
        })
    };
    let watchers = {
        let facade = Arc::clone(&facade);
        thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..200 {
                let results = facade.watch_machines(&["machine-0"]).unwrap();
                ids.extend(results.into_iter().filter_map(|r| r.watcher_id));
            }
            ids
        })
    };
    churn.join().unwrap();
    let ids = watchers.join().unwrap();

    // Every handle either still observes the live machine or reports its
    // removal; none is left dangling.
    for id in &ids {
        match registry.poll(id) {
            Ok(_) => {}
            Err(e) => assert_eq!(
                e,
                WatcherError::Closed {
                    reason: "entity removed".to_string()
                }
            ),
        }
    }
    assert_eq!(registry.release_all(), ids.len());
    assert!(registry.is_empty());
}
