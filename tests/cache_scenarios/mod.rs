//! Cache Scenario Tests
//!
//! End-to-end behaviour through the public API:
//! - Structural-change publishing (attribute update vs reassignment)
//! - Removal messages and not-found removals
//! - Eviction releasing cleanup handles exactly once
//! - Resync via mark_stale + sweep

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use fleet_cache::hub;
use fleet_cache::CleanupHandle;
use fleet_cache::EntityChange;
use fleet_cache::EntityKind;
use fleet_cache::HubMessage;
use fleet_cache::ModelChange;
use fleet_cache::RemovalMessage;
use fleet_cache::Resident;
use fleet_cache::ResidentId;
use fleet_cache::UnitChange;
use tracing_test::traced_test;

use crate::common::apply_machine;
use crate::common::apply_unit;
use crate::common::capture;
use crate::common::controller;
use crate::common::drain;
use crate::common::machine;
use crate::common::unit;
use crate::common::MODEL_UUID;

/// Test: attribute-only update publishes nothing beyond the initial add
#[test]
#[traced_test]
fn attribute_update_publishes_only_initial_add() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::UNIT_ADD);

    apply_unit(&controller, unit("u1", "m0"));
    apply_unit(
        &controller,
        UnitChange {
            config_hash: "abc".to_string(),
            ..unit("u1", "m0")
        },
    );

    assert_eq!(drain(&rx).len(), 1);
    let snapshot = controller.model_cache(MODEL_UUID).unwrap().unit("u1").unwrap();
    assert_eq!(snapshot.config_hash(), "abc");
}

/// Test: host reassignment publishes again
#[test]
fn reassignment_publishes_twice() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::UNIT_ADD);

    apply_unit(&controller, unit("u1", "m0"));
    apply_unit(&controller, unit("u1", "m1"));

    let machines: Vec<String> = drain(&rx)
        .into_iter()
        .map(|message| match message {
            HubMessage::Unit(u) => u.machine_id().to_string(),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(machines, vec!["m0", "m1"]);
}

/// Test: promotion to subordinate publishes
#[test]
fn promotion_to_subordinate_publishes() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::UNIT_ADD);

    apply_unit(&controller, unit("u1", "m0"));
    apply_unit(
        &controller,
        UnitChange {
            subordinate: true,
            principal: "u0".to_string(),
            ..unit("u1", "m0")
        },
    );

    assert_eq!(drain(&rx).len(), 2);
}

/// Test: removal announces the identity captured at first population
#[test]
fn removal_announces_first_identity() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::UNIT_REMOVE);
    apply_unit(&controller, unit("u1", "m0"));
    apply_unit(&controller, unit("u1", "m3"));

    assert!(controller.apply_removal(RemovalMessage::Unit {
        model_uuid: MODEL_UUID.to_string(),
        name: "u1".to_string(),
    }));

    assert_eq!(
        drain(&rx),
        vec![HubMessage::Removed(RemovalMessage::Unit {
            model_uuid: MODEL_UUID.to_string(),
            name: "u1".to_string(),
        })]
    );
}

/// Test: removal of something never cached is a no-op
#[test]
fn removal_of_absent_entity_is_a_noop() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::MACHINE_REMOVE);

    assert!(!controller.apply_removal(RemovalMessage::Machine {
        model_uuid: MODEL_UUID.to_string(),
        id: "9".to_string(),
    }));

    apply_machine(&controller, machine("0"));
    assert!(!controller.apply_removal(RemovalMessage::Machine {
        model_uuid: MODEL_UUID.to_string(),
        id: "9".to_string(),
    }));
    assert!(drain(&rx).is_empty());
}

/// Test: snapshots are detached from later updates
#[test]
fn snapshot_is_detached() {
    let controller = controller();
    apply_unit(&controller, unit("u1", "m0"));
    let model = controller.model_cache(MODEL_UUID).unwrap();
    let before = model.unit("u1").unwrap();

    apply_unit(&controller, unit("u1", "m1"));

    assert_eq!(before.machine_id(), "m0");
    assert_eq!(model.unit("u1").unwrap().machine_id(), "m1");
}

/// Test: two cleanup handles, evict twice
#[test]
fn eviction_releases_each_handle_once() {
    let resident = Resident::new(ResidentId::new(EntityKind::Unit, MODEL_UUID, "u1"));
    let released = Arc::new(AtomicUsize::new(0));
    let handles: Vec<CleanupHandle> = (0..2)
        .map(|i| {
            let released = Arc::clone(&released);
            CleanupHandle::new(format!("handle-{i}"), move || {
                released.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for handle in &handles {
        resident.register_cleanup(handle.clone()).unwrap();
    }

    resident.evict();
    assert!(resident.evict().is_none());

    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert!(handles.iter().all(CleanupHandle::is_released));
    assert!(resident.register_cleanup(CleanupHandle::new("late", || {})).is_err());
}

/// Test: resync keeps what was re-sent and evicts the rest
#[test]
fn resync_sweeps_what_was_not_resent() {
    let controller = controller();
    let (_sub, rx) = capture(controller.hub(), hub::UNIT_REMOVE);
    let model_change = || {
        EntityChange::Model(ModelChange {
            model_uuid: MODEL_UUID.to_string(),
            name: "prod".to_string(),
            ..Default::default()
        })
    };
    controller.apply_change(model_change()).unwrap();
    apply_unit(&controller, unit("u1", "m0"));
    apply_unit(&controller, unit("u2", "m0"));
    apply_machine(&controller, machine("m0"));

    controller.mark_stale();
    let model = controller.model_cache(MODEL_UUID).unwrap();
    assert!(model.unit("u1").is_none());

    controller.apply_change(model_change()).unwrap();
    apply_unit(&controller, unit("u1", "m0"));
    apply_machine(&controller, machine("m0"));

    assert_eq!(controller.sweep(), 1);
    assert_eq!(
        drain(&rx),
        vec![HubMessage::Removed(RemovalMessage::Unit {
            model_uuid: MODEL_UUID.to_string(),
            name: "u2".to_string(),
        })]
    );
    assert_eq!(model.units(|_| true).count(), 1);
    assert!(model.machine("m0").is_some());
}
