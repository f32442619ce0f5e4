use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::EntityDetails;
use super::EntityKind;
use super::Life;
use super::RemovalMessage;
use crate::hub::HubMessage;

/// An exposed network port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub protocol: String,
    pub number: u16,
}

impl Port {
    pub fn new(
        protocol: impl Into<String>,
        number: u16,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            number,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}

/// Complete snapshot of a unit from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitChange {
    pub model_uuid: String,
    pub name: String,
    pub application: String,
    pub series: String,
    pub charm_url: String,
    pub life: Life,
    pub public_address: String,
    pub private_address: String,
    /// Hosting machine; empty until the unit is assigned.
    pub machine_id: String,
    pub ports: Vec<Port>,
    pub subordinate: bool,
    /// Principal unit name, for subordinates. Lookup only.
    pub principal: String,
    pub config_hash: String,
}

impl EntityDetails for UnitChange {
    const KIND: EntityKind = EntityKind::Unit;
    type Snapshot = Unit;

    fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    fn key(&self) -> &str {
        &self.name
    }

    fn removal_message(&self) -> RemovalMessage {
        RemovalMessage::Unit {
            model_uuid: self.model_uuid.clone(),
            name: self.name.clone(),
        }
    }

    /// Units-per-machine aggregations only care about host reassignment and
    /// subordinates; attribute updates stay local.
    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool {
        let previous_machine = previous.map(|p| p.machine_id.as_str()).unwrap_or_default();
        previous_machine != self.machine_id || self.subordinate
    }

    fn snapshot(&self) -> Unit {
        Unit {
            details: self.clone(),
        }
    }

    fn announce(snapshot: Unit) -> HubMessage {
        HubMessage::Unit(snapshot)
    }
}

/// Detached, read-only view of a cached unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    details: UnitChange,
}

impl Unit {
    pub fn model_uuid(&self) -> &str {
        &self.details.model_uuid
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn application(&self) -> &str {
        &self.details.application
    }

    pub fn series(&self) -> &str {
        &self.details.series
    }

    pub fn life(&self) -> Life {
        self.details.life
    }

    /// ID of the machine hosting this unit.
    pub fn machine_id(&self) -> &str {
        &self.details.machine_id
    }

    pub fn subordinate(&self) -> bool {
        self.details.subordinate
    }

    /// Name of the principal unit, for subordinates.
    pub fn principal(&self) -> &str {
        &self.details.principal
    }

    pub fn charm_url(&self) -> &str {
        &self.details.charm_url
    }

    pub fn public_address(&self) -> &str {
        &self.details.public_address
    }

    pub fn private_address(&self) -> &str {
        &self.details.private_address
    }

    pub fn ports(&self) -> &[Port] {
        &self.details.ports
    }

    pub fn config_hash(&self) -> &str {
        &self.details.config_hash
    }
}
