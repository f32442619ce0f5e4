use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::Application;
use super::ApplicationChange;
use super::CachedResident;
use super::Collection;
use super::EntityChange;
use super::EntityDetails;
use super::EntityKind;
use super::LiveEntity;
use super::Machine;
use super::MachineChange;
use super::Model;
use super::ModelChange;
use super::Relation;
use super::RelationChange;
use super::RemovalMessage;
use super::ResidentId;
use super::Unit;
use super::UnitChange;
use crate::hub::Hub;
use crate::hub::HubMessage;
use crate::hub::Subscription;
use crate::watcher::next_notifier_id;
use crate::watcher::signal;
use crate::watcher::signal_channel;
use crate::watcher::Notifier;
use crate::CacheError;
use crate::ControllerGauges;
use crate::Result;

/// Cache of one model: the model's own resident plus a collection per
/// entity kind.
///
/// All reads return detached snapshots. Mutations are crate-internal and
/// arrive through the [`Controller`](super::Controller).
pub struct ModelCache {
    model_uuid: String,
    live: LiveEntity<ModelChange>,
    /// Shared by mutations, exclusive for retirement: nothing lands in a
    /// model while it is being torn down.
    lifecycle: RwLock<()>,
    applications: Collection<ApplicationChange>,
    machines: Collection<MachineChange>,
    units: Collection<UnitChange>,
    relations: Collection<RelationChange>,
    hub: Hub,
}

impl ModelCache {
    pub(crate) fn new(
        model_uuid: impl Into<String>,
        hub: Hub,
        gauges: Arc<ControllerGauges>,
    ) -> Self {
        let model_uuid = model_uuid.into();
        gauges.resident_added(EntityKind::Model);
        Self {
            live: LiveEntity::new(
                ResidentId::new(EntityKind::Model, model_uuid.clone(), model_uuid.clone()),
                hub.clone(),
                Arc::clone(&gauges),
            ),
            lifecycle: RwLock::new(()),
            applications: Collection::new(model_uuid.clone(), hub.clone(), Arc::clone(&gauges)),
            machines: Collection::new(model_uuid.clone(), hub.clone(), Arc::clone(&gauges)),
            units: Collection::new(model_uuid.clone(), hub.clone(), Arc::clone(&gauges)),
            relations: Collection::new(model_uuid.clone(), hub.clone(), gauges),
            hub,
            model_uuid,
        }
    }

    pub fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    /// Stale until the model's own details arrive, and again once marked
    /// stale for a sweep.
    pub fn is_stale(&self) -> bool {
        self.live.is_stale()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.live.resident().is_evicted()
    }

    pub(crate) fn apply(
        &self,
        change: EntityChange,
    ) -> Result<()> {
        let _lifecycle = self.lifecycle.read();
        if self.is_retired() {
            return Err(CacheError::ResidentEvicted {
                id: self.live.id().to_string(),
            }
            .into());
        }

        match change {
            EntityChange::Model(details) => {
                details.validate()?;
                self.live.set_details(details)
            }
            EntityChange::Application(details) => self.applications.apply(details),
            EntityChange::Machine(details) => self.machines.apply(details),
            EntityChange::Unit(details) => self.units.apply(details),
            EntityChange::Relation(details) => self.relations.apply(details),
        }
    }

    /// Remove one child entity. Model removal belongs to the controller.
    pub(crate) fn remove(
        &self,
        removal: &RemovalMessage,
    ) -> bool {
        let _lifecycle = self.lifecycle.read();
        match removal {
            RemovalMessage::Model { .. } => false,
            RemovalMessage::Application { name, .. } => self.applications.remove(name),
            RemovalMessage::Machine { id, .. } => self.machines.remove(id),
            RemovalMessage::Unit { name, .. } => self.units.remove(name),
            RemovalMessage::Relation { key, .. } => self.relations.remove(key),
        }
    }

    /// Evict every child, then the model itself. Returns the number of
    /// residents evicted.
    pub(crate) fn retire(&self) -> usize {
        let _lifecycle = self.lifecycle.write();
        let mut evicted = self.units.clear()
            + self.relations.clear()
            + self.machines.clear()
            + self.applications.clear();

        self.live.mark_stale();
        if !self.is_retired() {
            if let Some(message) = self.live.evict() {
                self.hub.publish(EntityKind::Model.remove_topic(), HubMessage::Removed(message));
            }
            evicted += 1;
        }
        debug!(model_uuid = %self.model_uuid, evicted, "Model retired");
        evicted
    }

    pub(crate) fn mark_stale(&self) {
        self.live.mark_stale();
        self.applications.mark_stale();
        self.machines.mark_stale();
        self.units.mark_stale();
        self.relations.mark_stale();
    }

    /// Evict the children still stale. Returns the number evicted.
    pub(crate) fn sweep(&self) -> usize {
        let _lifecycle = self.lifecycle.read();
        self.units.sweep() + self.relations.sweep() + self.machines.sweep() + self.applications.sweep()
    }

    /// Number of residents held, the model's own included.
    pub fn resident_count(&self) -> usize {
        1 + self.applications.len() + self.machines.len() + self.units.len() + self.relations.len()
    }

    //---
    // Snapshot reads

    pub fn model(&self) -> Option<Model> {
        self.live.snapshot()
    }

    pub fn application(
        &self,
        name: &str,
    ) -> Option<Application> {
        self.applications.snapshot(name)
    }

    pub fn applications<F>(
        &self,
        predicate: F,
    ) -> impl Iterator<Item = Application>
    where
        F: Fn(&Application) -> bool,
    {
        self.applications.snapshot_all(predicate)
    }

    pub fn machine(
        &self,
        id: &str,
    ) -> Option<Machine> {
        self.machines.snapshot(id)
    }

    pub fn machines<F>(
        &self,
        predicate: F,
    ) -> impl Iterator<Item = Machine>
    where
        F: Fn(&Machine) -> bool,
    {
        self.machines.snapshot_all(predicate)
    }

    pub fn unit(
        &self,
        name: &str,
    ) -> Option<Unit> {
        self.units.snapshot(name)
    }

    pub fn units<F>(
        &self,
        predicate: F,
    ) -> impl Iterator<Item = Unit>
    where
        F: Fn(&Unit) -> bool,
    {
        self.units.snapshot_all(predicate)
    }

    /// Units assigned to `machine_id`, subordinates included.
    pub fn units_on_machine(
        &self,
        machine_id: &str,
    ) -> Vec<Unit> {
        let machine_id = machine_id.to_string();
        self.units(move |unit| unit.machine_id() == machine_id).collect()
    }

    pub fn relation(
        &self,
        key: &str,
    ) -> Option<Relation> {
        self.relations.snapshot(key)
    }

    pub fn relations<F>(
        &self,
        predicate: F,
    ) -> impl Iterator<Item = Relation>
    where
        F: Fn(&Relation) -> bool,
    {
        self.relations.snapshot_all(predicate)
    }

    //---
    // Watchers

    /// Notifier for changes to the model's own details.
    pub fn watch_model(&self) -> Option<Notifier> {
        if self.live.is_stale() {
            return None;
        }
        self.live.watch().ok()
    }

    pub fn watch_application(
        &self,
        name: &str,
    ) -> Option<Notifier> {
        self.applications.watch(name)
    }

    pub fn watch_machine(
        &self,
        id: &str,
    ) -> Option<Notifier> {
        self.machines.watch(id)
    }

    pub fn watch_unit(
        &self,
        name: &str,
    ) -> Option<Notifier> {
        self.units.watch(name)
    }

    pub fn watch_relation(
        &self,
        key: &str,
    ) -> Option<Notifier> {
        self.relations.watch(key)
    }

    /// Notifier for structural changes and removals among this model's
    /// applications.
    pub fn watch_applications(&self) -> Result<Notifier> {
        self.watch_collection(EntityKind::Application)
    }

    pub fn watch_machines(&self) -> Result<Notifier> {
        self.watch_collection(EntityKind::Machine)
    }

    pub fn watch_units(&self) -> Result<Notifier> {
        self.watch_collection(EntityKind::Unit)
    }

    pub fn watch_relations(&self) -> Result<Notifier> {
        self.watch_collection(EntityKind::Relation)
    }

    /// Collection notifier backed by hub subscriptions on the kind's add and
    /// remove topics. Torn down with the model.
    fn watch_collection(
        &self,
        kind: EntityKind,
    ) -> Result<Notifier> {
        let (tx, rx) = signal_channel();
        let subscriptions: Vec<Subscription> = [kind.add_topic(), kind.remove_topic()]
            .into_iter()
            .map(|topic| {
                let tx = tx.clone();
                let model_uuid = self.model_uuid.clone();
                self.hub.subscribe(topic, move |_topic, message| {
                    if message.model_uuid() == model_uuid {
                        signal(&tx);
                    }
                })
            })
            .collect();

        let notifier = Notifier::new(
            next_notifier_id(),
            format!("{}/{}s", self.model_uuid, kind),
            rx,
            move || drop(subscriptions),
        );
        // On failure the notifier drops here and unsubscribes.
        self.live.register_cleanup(notifier.cleanup_handle())?;
        Ok(notifier)
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("model_uuid", &self.model_uuid)
            .field("stale", &self.is_stale())
            .field("residents", &self.resident_count())
            .finish()
    }
}
