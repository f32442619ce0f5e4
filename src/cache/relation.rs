use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::EntityDetails;
use super::EntityKind;
use super::RemovalMessage;
use crate::hub::HubMessage;

/// Role of a relation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationRole {
    Provider,
    Requirer,
    Peer,
}

/// Scope of a relation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationScope {
    #[default]
    Global,
    Container,
}

/// One application's side of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationEndpoint {
    pub application: String,
    pub interface: String,
    pub name: String,
    pub role: RelationRole,
    pub scope: RelationScope,
}

impl fmt::Display for RelationEndpoint {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.application, self.name)
    }
}

/// Complete snapshot of a relation from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationChange {
    pub model_uuid: String,
    /// Endpoints joined by spaces, e.g. `wordpress:db mysql:server`.
    pub key: String,
    pub endpoints: Vec<RelationEndpoint>,
}

impl EntityDetails for RelationChange {
    const KIND: EntityKind = EntityKind::Relation;
    type Snapshot = Relation;

    fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn removal_message(&self) -> RemovalMessage {
        RemovalMessage::Relation {
            model_uuid: self.model_uuid.clone(),
            key: self.key.clone(),
        }
    }

    /// Endpoints are fixed for a relation's lifetime.
    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool {
        previous.is_none()
    }

    fn snapshot(&self) -> Relation {
        Relation {
            details: self.clone(),
        }
    }

    fn announce(snapshot: Relation) -> HubMessage {
        HubMessage::Relation(snapshot)
    }
}

/// Detached, read-only view of a cached relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    details: RelationChange,
}

impl Relation {
    pub fn model_uuid(&self) -> &str {
        &self.details.model_uuid
    }

    pub fn key(&self) -> &str {
        &self.details.key
    }

    pub fn endpoints(&self) -> &[RelationEndpoint] {
        &self.details.endpoints
    }

    /// The endpoint attached to `application`, if it takes part.
    pub fn endpoint(
        &self,
        application: &str,
    ) -> Option<&RelationEndpoint> {
        self.details.endpoints.iter().find(|ep| ep.application == application)
    }

    pub fn involves(
        &self,
        application: &str,
    ) -> bool {
        self.endpoint(application).is_some()
    }
}

impl fmt::Display for Relation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let names: Vec<String> = self.details.endpoints.iter().map(ToString::to_string).collect();
        write!(f, "relation {:?}", names.join(" "))
    }
}
