use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use fleet_cache::hub::Hub;
use fleet_cache::Authorizer;
use fleet_cache::CacheSettings;
use fleet_cache::Controller;
use fleet_cache::ControllerGauges;
use fleet_cache::EntityChange;
use fleet_cache::HubMessage;
use fleet_cache::MachineChange;
use fleet_cache::Subscription;
use fleet_cache::UnitChange;

pub const MODEL_UUID: &str = "5a1e4c3b-9f0d-4e6a-8b7c-2d1f0e9a8b7c";

const QUIET_PERIOD: Duration = Duration::from_millis(150);

pub fn controller() -> Arc<Controller> {
    Arc::new(Controller::new(&CacheSettings::default(), Arc::new(ControllerGauges::new())).expect("hub runtime"))
}

pub fn unit(
    name: &str,
    machine_id: &str,
) -> UnitChange {
    UnitChange {
        model_uuid: MODEL_UUID.to_string(),
        name: name.to_string(),
        application: name.split('/').next().unwrap_or_default().to_string(),
        machine_id: machine_id.to_string(),
        ..Default::default()
    }
}

pub fn machine(id: &str) -> MachineChange {
    MachineChange {
        model_uuid: MODEL_UUID.to_string(),
        id: id.to_string(),
        ..Default::default()
    }
}

pub fn apply_unit(
    controller: &Controller,
    change: UnitChange,
) {
    controller.apply_change(EntityChange::Unit(change)).unwrap();
}

pub fn apply_machine(
    controller: &Controller,
    change: MachineChange,
) {
    controller.apply_change(EntityChange::Machine(change)).unwrap();
}

/// Collect every message published on `topic` until the hub goes quiet.
pub fn capture(
    hub: &Hub,
    topic: &str,
) -> (Subscription, Receiver<HubMessage>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let subscription = hub.subscribe(topic, move |_, message| {
        let _ = tx.send(message.clone());
    });
    (subscription, rx)
}

pub fn drain(rx: &Receiver<HubMessage>) -> Vec<HubMessage> {
    let mut received = Vec::new();
    while let Ok(message) = rx.recv_timeout(QUIET_PERIOD) {
        received.push(message);
    }
    received
}

/// Machine agent owning exactly the listed tags.
pub struct StaticAuthorizer {
    pub owned: Vec<String>,
}

impl Authorizer for StaticAuthorizer {
    fn auth_machine_agent(&self) -> bool {
        true
    }

    fn auth_owner(
        &self,
        tag: &str,
    ) -> bool {
        self.owned.iter().any(|owned| owned == tag)
    }
}
