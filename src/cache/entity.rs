//! Live cached entities and the keyed collections that own them.
//!
//! A [`LiveEntity`] never leaves the cache. Its details are replaced
//! wholesale under a per-identity lock and read lock-free through
//! `ArcSwapOption`; readers receive detached snapshots only.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::CachedResident;
use super::EntityKind;
use super::RemovalMessage;
use super::Resident;
use super::ResidentId;
use crate::hub::Hub;
use crate::hub::HubMessage;
use crate::watcher::Notifier;
use crate::watcher::NotifierSet;
use crate::CacheError;
use crate::ControllerGauges;
use crate::Error;
use crate::Result;

/// Domain payload of one entity kind.
///
/// Implementors are complete snapshots: every applied change replaces the
/// previous value, nothing is merged.
pub(crate) trait EntityDetails: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Detached, read-only view handed to callers and hub subscribers.
    type Snapshot: Clone + Send + 'static;

    fn model_uuid(&self) -> &str;

    /// Natural key within the model's collection of this kind.
    fn key(&self) -> &str;

    /// Identity-bearing fields only.
    fn removal_message(&self) -> RemovalMessage;

    /// Whether replacing `previous` with `self` must be announced on the hub.
    fn is_structural_change(
        &self,
        previous: Option<&Self>,
    ) -> bool;

    fn snapshot(&self) -> Self::Snapshot;

    fn announce(snapshot: Self::Snapshot) -> HubMessage;

    fn validate(&self) -> Result<()> {
        let reason = if self.model_uuid().is_empty() {
            "empty model uuid"
        } else if self.key().is_empty() {
            "empty identity"
        } else {
            return Ok(());
        };
        Err(CacheError::MalformedChange {
            kind: Self::KIND,
            key: self.key().to_string(),
            reason: reason.to_string(),
        }
        .into())
    }
}

pub(crate) struct LiveEntity<D: EntityDetails> {
    resident: Resident,
    details: ArcSwapOption<D>,
    /// Serializes details updates, watch registration and eviction for
    /// this identity.
    apply_lock: Mutex<()>,
    notifiers: Arc<NotifierSet>,
    hub: Hub,
    gauges: Arc<ControllerGauges>,
}

impl<D: EntityDetails> LiveEntity<D> {
    pub(crate) fn new(
        id: ResidentId,
        hub: Hub,
        gauges: Arc<ControllerGauges>,
    ) -> Self {
        Self {
            resident: Resident::new(id),
            details: ArcSwapOption::empty(),
            apply_lock: Mutex::new(()),
            notifiers: Arc::new(NotifierSet::default()),
            hub,
            gauges,
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.resident.id().key
    }

    /// Replace the details with a complete snapshot.
    ///
    /// Publishes a detached copy on the kind's add topic when the change is
    /// structural, and signals every notifier of this entity regardless.
    ///
    /// # Errors
    /// `CacheError::ResidentEvicted` if eviction won the race for this
    /// identity.
    pub(crate) fn set_details(
        &self,
        details: D,
    ) -> Result<()> {
        let _guard = self.apply_lock.lock();
        if self.resident.is_evicted() {
            return Err(CacheError::ResidentEvicted {
                id: self.resident.id().to_string(),
            }
            .into());
        }

        self.resident.capture_removal_message(|| details.removal_message());
        self.resident.set_stale(false);

        let current = Arc::new(details);
        let previous = self.details.swap(Some(Arc::clone(&current)));
        self.gauges.change_applied(D::KIND);

        if current.is_structural_change(previous.as_deref()) {
            let delivered = self.hub.publish(D::KIND.add_topic(), D::announce(current.snapshot()));
            self.gauges.structural_published(D::KIND);
            trace!(id = %self.resident.id(), delivered, "Structural change published");
        } else {
            trace!(id = %self.resident.id(), "Details updated in place");
        }

        self.notifiers.notify();
        Ok(())
    }

    /// Detached copy of the current details; `None` while stale.
    pub(crate) fn snapshot(&self) -> Option<D::Snapshot> {
        if self.resident.is_stale() {
            return None;
        }
        self.details.load_full().map(|details| details.snapshot())
    }

    /// Notifier signalled on every applied change to this entity.
    pub(crate) fn watch(&self) -> Result<Notifier> {
        let _guard = self.apply_lock.lock();
        let notifier = self.notifiers.create(self.resident.id().to_string());
        // On failure the notifier drops here and stops itself.
        self.resident.register_cleanup(notifier.cleanup_handle())?;
        Ok(notifier)
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.notifiers.len()
    }
}

impl<D: EntityDetails> CachedResident for LiveEntity<D> {
    fn resident(&self) -> &Resident {
        &self.resident
    }

    fn evict(&self) -> Option<RemovalMessage> {
        let _guard = self.apply_lock.lock();
        if self.resident.is_evicted() {
            return None;
        }
        let message = self.resident.evict();
        self.gauges.resident_evicted(D::KIND);
        message
    }
}

impl<D: EntityDetails> fmt::Debug for LiveEntity<D> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LiveEntity")
            .field("resident", &self.resident)
            .field("details", &self.details.load_full())
            .finish_non_exhaustive()
    }
}

/// All residents of one kind within one model, keyed by natural key.
pub(crate) struct Collection<D: EntityDetails> {
    model_uuid: String,
    entries: DashMap<String, Arc<LiveEntity<D>>>,
    hub: Hub,
    gauges: Arc<ControllerGauges>,
}

impl<D: EntityDetails> Collection<D> {
    pub(crate) fn new(
        model_uuid: impl Into<String>,
        hub: Hub,
        gauges: Arc<ControllerGauges>,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            entries: DashMap::new(),
            hub,
            gauges,
        }
    }

    /// Route a complete snapshot to its resident, creating it on first sight.
    pub(crate) fn apply(
        &self,
        details: D,
    ) -> Result<()> {
        details.validate()?;
        if details.model_uuid() != self.model_uuid {
            return Err(CacheError::MalformedChange {
                kind: D::KIND,
                key: details.key().to_string(),
                reason: format!("belongs to model {}", details.model_uuid()),
            }
            .into());
        }

        let key = details.key().to_string();
        loop {
            let entity = self.get_or_create(&key);
            match entity.set_details(details.clone()) {
                Err(Error::Cache(CacheError::ResidentEvicted { .. })) => {
                    // Removal won the race; start over with a fresh resident.
                    self.entries.remove_if(&key, |_, e| Arc::ptr_eq(e, &entity));
                }
                result => return result,
            }
        }
    }

    fn get_or_create(
        &self,
        key: &str,
    ) -> Arc<LiveEntity<D>> {
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            self.gauges.resident_added(D::KIND);
            debug!(kind = %D::KIND, model_uuid = %self.model_uuid, key, "Resident created");
            Arc::new(LiveEntity::new(
                ResidentId::new(D::KIND, self.model_uuid.clone(), key),
                self.hub.clone(),
                Arc::clone(&self.gauges),
            ))
        });
        Arc::clone(entry.value())
    }

    pub(crate) fn get(
        &self,
        key: &str,
    ) -> Option<Arc<LiveEntity<D>>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Evict the resident for `key` and announce its removal.
    ///
    /// Returns `false` when there was nothing to remove.
    pub(crate) fn remove(
        &self,
        key: &str,
    ) -> bool {
        match self.entries.remove(key) {
            Some((_, entity)) => {
                self.retire(&entity);
                true
            }
            None => false,
        }
    }

    fn retire(
        &self,
        entity: &LiveEntity<D>,
    ) {
        entity.mark_stale();
        if let Some(message) = entity.evict() {
            self.hub.publish(D::KIND.remove_topic(), HubMessage::Removed(message));
        }
    }

    pub(crate) fn snapshot(
        &self,
        key: &str,
    ) -> Option<D::Snapshot> {
        self.get(key)?.snapshot()
    }

    /// Snapshots ordered by key, produced lazily.
    ///
    /// Membership is captured up front; each element is read when the
    /// iterator reaches it, so the sequence may interleave with concurrent
    /// updates.
    pub(crate) fn snapshot_all<F>(
        &self,
        predicate: F,
    ) -> impl Iterator<Item = D::Snapshot>
    where
        F: Fn(&D::Snapshot) -> bool,
    {
        let mut entities: Vec<Arc<LiveEntity<D>>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        entities.sort_by(|a, b| a.key().cmp(b.key()));
        entities
            .into_iter()
            .filter_map(|entity| entity.snapshot())
            .filter(move |snapshot| predicate(snapshot))
    }

    /// Per-entity notifier; `None` if the entity is absent or stale.
    pub(crate) fn watch(
        &self,
        key: &str,
    ) -> Option<Notifier> {
        let entity = self.get(key)?;
        if entity.is_stale() {
            return None;
        }
        entity.watch().ok()
    }

    pub(crate) fn mark_stale(&self) {
        for entry in self.entries.iter() {
            entry.value().mark_stale();
        }
    }

    /// Evict every resident still stale. Returns the number evicted.
    pub(crate) fn sweep(&self) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_stale())
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale {
            if let Some((_, entity)) = self.entries.remove_if(&key, |_, e| e.is_stale()) {
                self.retire(&entity);
                evicted += 1;
            }
        }
        evicted
    }

    /// Evict everything. Returns the number evicted.
    pub(crate) fn clear(&self) -> usize {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.remove(key)).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
