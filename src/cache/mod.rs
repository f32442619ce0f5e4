//! In-memory mirror of controller model state.
//!
//! The cache is fed complete entity snapshots and removal notices from the
//! authoritative store. Every cached entity embeds a [`Resident`], which owns
//! its identity, staleness, removal message and the cleanup handles of any
//! dependent resources (watchers). Readers only ever see detached snapshot
//! values such as [`Unit`] or [`Machine`]; live entities never leave the
//! cache.
//!
//! ```text
//! change feed ──► Controller::apply ──► ModelCache ──► Collection<D>
//!                                                        │ set_details
//!                                                        ▼
//!                                  Hub::publish ◄── structural change?
//!                                  notifiers    ◄── every change
//! ```

mod application;
mod controller;
mod entity;
mod machine;
mod model;
mod model_cache;
mod relation;
mod resident;
mod unit;

#[cfg(test)]
mod controller_test;

pub use application::*;
pub use controller::*;
pub(crate) use entity::Collection;
pub(crate) use entity::EntityDetails;
pub(crate) use entity::LiveEntity;
pub use machine::*;
pub use model::*;
pub use model_cache::*;
pub use relation::*;
pub use resident::*;
pub use unit::*;

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::hub;

/// Kind of a cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Application,
    Machine,
    Unit,
    Relation,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Application => "application",
            EntityKind::Machine => "machine",
            EntityKind::Unit => "unit",
            EntityKind::Relation => "relation",
        }
    }

    /// Hub topic for structural additions and reassignments of this kind.
    pub fn add_topic(&self) -> &'static str {
        match self {
            EntityKind::Model => hub::MODEL_ADD,
            EntityKind::Application => hub::APPLICATION_ADD,
            EntityKind::Machine => hub::MACHINE_ADD,
            EntityKind::Unit => hub::UNIT_ADD,
            EntityKind::Relation => hub::RELATION_ADD,
        }
    }

    /// Hub topic for removals of this kind.
    pub fn remove_topic(&self) -> &'static str {
        match self {
            EntityKind::Model => hub::MODEL_REMOVE,
            EntityKind::Application => hub::APPLICATION_REMOVE,
            EntityKind::Machine => hub::MACHINE_REMOVE,
            EntityKind::Unit => hub::UNIT_REMOVE,
            EntityKind::Relation => hub::RELATION_REMOVE,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state reported by the authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    #[default]
    Alive,
    Dying,
    Dead,
}

/// Identity-bearing record announcing that an entity left the cache.
///
/// The same shape doubles as the removal notice consumed from the change
/// feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemovalMessage {
    Model { model_uuid: String },
    Application { model_uuid: String, name: String },
    Machine { model_uuid: String, id: String },
    Unit { model_uuid: String, name: String },
    Relation { model_uuid: String, key: String },
}

impl RemovalMessage {
    pub fn kind(&self) -> EntityKind {
        match self {
            RemovalMessage::Model { .. } => EntityKind::Model,
            RemovalMessage::Application { .. } => EntityKind::Application,
            RemovalMessage::Machine { .. } => EntityKind::Machine,
            RemovalMessage::Unit { .. } => EntityKind::Unit,
            RemovalMessage::Relation { .. } => EntityKind::Relation,
        }
    }

    pub fn model_uuid(&self) -> &str {
        match self {
            RemovalMessage::Model { model_uuid }
            | RemovalMessage::Application { model_uuid, .. }
            | RemovalMessage::Machine { model_uuid, .. }
            | RemovalMessage::Unit { model_uuid, .. }
            | RemovalMessage::Relation { model_uuid, .. } => model_uuid,
        }
    }

    /// Natural key of the removed entity within its collection.
    pub fn key(&self) -> &str {
        match self {
            RemovalMessage::Model { model_uuid } => model_uuid,
            RemovalMessage::Application { name, .. } => name,
            RemovalMessage::Machine { id, .. } => id,
            RemovalMessage::Unit { name, .. } => name,
            RemovalMessage::Relation { key, .. } => key,
        }
    }
}

/// Complete snapshot of one entity, as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityChange {
    Model(ModelChange),
    Application(ApplicationChange),
    Machine(MachineChange),
    Unit(UnitChange),
    Relation(RelationChange),
}

impl EntityChange {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityChange::Model(_) => EntityKind::Model,
            EntityChange::Application(_) => EntityKind::Application,
            EntityChange::Machine(_) => EntityKind::Machine,
            EntityChange::Unit(_) => EntityKind::Unit,
            EntityChange::Relation(_) => EntityKind::Relation,
        }
    }

    pub fn model_uuid(&self) -> &str {
        match self {
            EntityChange::Model(c) => &c.model_uuid,
            EntityChange::Application(c) => &c.model_uuid,
            EntityChange::Machine(c) => &c.model_uuid,
            EntityChange::Unit(c) => &c.model_uuid,
            EntityChange::Relation(c) => &c.model_uuid,
        }
    }
}

/// One item of the upstream change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Change(EntityChange),
    Removal(RemovalMessage),
}

impl From<EntityChange> for ChangeEvent {
    fn from(change: EntityChange) -> Self {
        ChangeEvent::Change(change)
    }
}

impl From<RemovalMessage> for ChangeEvent {
    fn from(removal: RemovalMessage) -> Self {
        ChangeEvent::Removal(removal)
    }
}
