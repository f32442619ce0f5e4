use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::EntityDetails;
use super::EntityKind;
use super::Life;
use super::RemovalMessage;
use crate::hub::HubMessage;

/// Complete snapshot of a model from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelChange {
    pub model_uuid: String,
    pub name: String,
    pub life: Life,
    pub owner: String,
    pub config: BTreeMap<String, String>,
}

impl EntityDetails for ModelChange {
    const KIND: EntityKind = EntityKind::Model;
    type Snapshot = Model;

    fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    fn key(&self) -> &str {
        &self.model_uuid
    }

    fn removal_message(&self) -> RemovalMessage {
        RemovalMessage::Model {
            model_uuid: self.model_uuid.clone(),
        }
    }

    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool {
        previous.is_none()
    }

    fn snapshot(&self) -> Model {
        Model {
            details: self.clone(),
        }
    }

    fn announce(snapshot: Model) -> HubMessage {
        HubMessage::Model(snapshot)
    }
}

/// Detached, read-only view of a cached model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    details: ModelChange,
}

impl Model {
    pub fn model_uuid(&self) -> &str {
        &self.details.model_uuid
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn life(&self) -> Life {
        self.details.life
    }

    pub fn owner(&self) -> &str {
        &self.details.owner
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.details.config
    }
}
