use crate::ApplicationChange;
use crate::EntityChange;
use crate::MachineChange;
use crate::ModelChange;
use crate::RelationChange;
use crate::RelationEndpoint;
use crate::RelationRole;
use crate::RelationScope;
use crate::UnitChange;

use super::MODEL_UUID;

pub(crate) fn model_change(name: &str) -> ModelChange {
    ModelChange {
        model_uuid: MODEL_UUID.to_string(),
        name: name.to_string(),
        owner: "admin".to_string(),
        ..Default::default()
    }
}

pub(crate) fn unit_change(
    name: &str,
    machine_id: &str,
) -> UnitChange {
    let application = name.split('/').next().unwrap_or(name).to_string();
    UnitChange {
        model_uuid: MODEL_UUID.to_string(),
        name: name.to_string(),
        application,
        series: "jammy".to_string(),
        charm_url: "ch:amd64/jammy/mysql-1".to_string(),
        machine_id: machine_id.to_string(),
        ..Default::default()
    }
}

pub(crate) fn subordinate_unit_change(
    name: &str,
    principal: &str,
    machine_id: &str,
) -> UnitChange {
    UnitChange {
        subordinate: true,
        principal: principal.to_string(),
        ..unit_change(name, machine_id)
    }
}

pub(crate) fn machine_change(id: &str) -> MachineChange {
    MachineChange {
        model_uuid: MODEL_UUID.to_string(),
        id: id.to_string(),
        series: "jammy".to_string(),
        ..Default::default()
    }
}

pub(crate) fn application_change(name: &str) -> ApplicationChange {
    ApplicationChange {
        model_uuid: MODEL_UUID.to_string(),
        name: name.to_string(),
        charm_url: format!("ch:amd64/jammy/{name}-1"),
        min_units: 1,
        ..Default::default()
    }
}

pub(crate) fn relation_change(
    provider: &str,
    requirer: &str,
) -> RelationChange {
    let endpoints = vec![
        RelationEndpoint {
            application: provider.to_string(),
            interface: "mysql".to_string(),
            name: "db".to_string(),
            role: RelationRole::Provider,
            scope: RelationScope::Global,
        },
        RelationEndpoint {
            application: requirer.to_string(),
            interface: "mysql".to_string(),
            name: "database".to_string(),
            role: RelationRole::Requirer,
            scope: RelationScope::Global,
        },
    ];
    RelationChange {
        model_uuid: MODEL_UUID.to_string(),
        key: format!("{provider}:db {requirer}:database"),
        endpoints,
    }
}

pub(crate) fn unit(
    name: &str,
    machine_id: &str,
) -> EntityChange {
    EntityChange::Unit(unit_change(name, machine_id))
}

pub(crate) fn machine(id: &str) -> EntityChange {
    EntityChange::Machine(machine_change(id))
}
