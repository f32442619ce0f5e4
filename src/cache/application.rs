use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::EntityDetails;
use super::EntityKind;
use super::Life;
use super::RemovalMessage;
use crate::hub::HubMessage;

/// Complete snapshot of an application from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationChange {
    pub model_uuid: String,
    pub name: String,
    pub exposed: bool,
    pub charm_url: String,
    pub life: Life,
    pub min_units: u32,
    pub config: BTreeMap<String, String>,
    pub subordinate: bool,
}

impl EntityDetails for ApplicationChange {
    const KIND: EntityKind = EntityKind::Application;
    type Snapshot = Application;

    fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    fn key(&self) -> &str {
        &self.name
    }

    fn removal_message(&self) -> RemovalMessage {
        RemovalMessage::Application {
            model_uuid: self.model_uuid.clone(),
            name: self.name.clone(),
        }
    }

    /// First sighting, or a charm upgrade.
    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool {
        previous.map_or(true, |previous| previous.charm_url != self.charm_url)
    }

    fn snapshot(&self) -> Application {
        Application {
            details: self.clone(),
        }
    }

    fn announce(snapshot: Application) -> HubMessage {
        HubMessage::Application(snapshot)
    }
}

/// Detached, read-only view of a cached application.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    details: ApplicationChange,
}

impl Application {
    pub fn model_uuid(&self) -> &str {
        &self.details.model_uuid
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn exposed(&self) -> bool {
        self.details.exposed
    }

    pub fn charm_url(&self) -> &str {
        &self.details.charm_url
    }

    pub fn life(&self) -> Life {
        self.details.life
    }

    pub fn min_units(&self) -> u32 {
        self.details.min_units
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.details.config
    }

    pub fn subordinate(&self) -> bool {
        self.details.subordinate
    }
}
