use serde::Deserialize;
use serde::Serialize;

use super::EntityDetails;
use super::EntityKind;
use super::Life;
use super::RemovalMessage;
use crate::hub::HubMessage;

/// Complete snapshot of a machine from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineChange {
    pub model_uuid: String,
    pub id: String,
    /// Provider instance; empty until provisioned.
    pub instance_id: String,
    pub life: Life,
    pub series: String,
    pub container_type: String,
    pub addresses: Vec<String>,
    pub has_vote: bool,
    pub wants_vote: bool,
}

impl EntityDetails for MachineChange {
    const KIND: EntityKind = EntityKind::Machine;
    type Snapshot = Machine;

    fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn removal_message(&self) -> RemovalMessage {
        RemovalMessage::Machine {
            model_uuid: self.model_uuid.clone(),
            id: self.id.clone(),
        }
    }

    /// First sighting, or the machine got (re)provisioned.
    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool {
        match previous {
            None => true,
            Some(previous) => previous.instance_id != self.instance_id,
        }
    }

    fn snapshot(&self) -> Machine {
        Machine {
            details: self.clone(),
        }
    }

    fn announce(snapshot: Machine) -> HubMessage {
        HubMessage::Machine(snapshot)
    }
}

/// Detached, read-only view of a cached machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    details: MachineChange,
}

impl Machine {
    pub fn model_uuid(&self) -> &str {
        &self.details.model_uuid
    }

    pub fn id(&self) -> &str {
        &self.details.id
    }

    pub fn instance_id(&self) -> &str {
        &self.details.instance_id
    }

    pub fn life(&self) -> Life {
        self.details.life
    }

    pub fn series(&self) -> &str {
        &self.details.series
    }

    pub fn container_type(&self) -> &str {
        &self.details.container_type
    }

    pub fn addresses(&self) -> &[String] {
        &self.details.addresses
    }

    pub fn has_vote(&self) -> bool {
        self.details.has_vote
    }

    pub fn wants_vote(&self) -> bool {
        self.details.wants_vote
    }

    /// Containers have ids like `0/lxd/1`.
    pub fn is_container(&self) -> bool {
        self.details.id.contains('/')
    }
}
