use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ChangeEvent;
use super::EntityChange;
use super::Model;
use super::ModelCache;
use super::RemovalMessage;
use crate::hub::Hub;
use crate::watcher::Notifier;
use crate::CacheError;
use crate::CacheSettings;
use crate::ControllerGauges;
use crate::Result;
use crate::StreamConfig;
use crate::StreamError;

pub type ChangeSender = mpsc::Sender<ChangeEvent>;
pub type ChangeReceiver = mpsc::Receiver<ChangeEvent>;

/// Bounded feed between the authoritative store and [`Controller::run`].
pub fn change_feed(config: &StreamConfig) -> (ChangeSender, ChangeReceiver) {
    mpsc::channel(config.change_queue_size.max(1))
}

/// Root of the cache: one [`ModelCache`] per known model, a shared hub
/// and shared gauges.
///
/// Models are created on the first change that names them and retired on
/// their removal notice.
pub struct Controller {
    models: DashMap<String, Arc<ModelCache>>,
    hub: Hub,
    gauges: Arc<ControllerGauges>,
}

impl Controller {
    /// # Errors
    /// `Error::IoError` if the hub's dispatch threads cannot be started.
    pub fn new(
        settings: &CacheSettings,
        gauges: Arc<ControllerGauges>,
    ) -> Result<Self> {
        Ok(Self {
            models: DashMap::new(),
            hub: Hub::new(settings.hub.clone(), Arc::clone(&gauges))?,
            gauges,
        })
    }

    /// The broker structural changes and removals are published on.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn gauges(&self) -> &Arc<ControllerGauges> {
        &self.gauges
    }

    /// Apply one item of the change feed.
    pub fn apply(
        &self,
        event: ChangeEvent,
    ) -> Result<()> {
        match event {
            ChangeEvent::Change(change) => self.apply_change(change),
            ChangeEvent::Removal(removal) => {
                if !self.apply_removal(removal.clone()) {
                    debug!(?removal, "Removal of an entity not in the cache");
                }
                Ok(())
            }
        }
    }

    /// Apply a complete entity snapshot, creating its model on first sight.
    ///
    /// # Errors
    /// `CacheError::MalformedChange` if the change is missing its identity.
    pub fn apply_change(
        &self,
        change: EntityChange,
    ) -> Result<()> {
        if change.model_uuid().is_empty() {
            return Err(CacheError::MalformedChange {
                kind: change.kind(),
                key: String::new(),
                reason: "empty model uuid".to_string(),
            }
            .into());
        }

        loop {
            let model = self.ensure_model(change.model_uuid());
            match model.apply(change.clone()) {
                Err(_) if model.is_retired() => {
                    // Retirement won the race; the change belongs to a fresh
                    // incarnation of the model.
                    self.models.remove_if(model.model_uuid(), |_, m| Arc::ptr_eq(m, &model));
                }
                result => return result,
            }
        }
    }

    /// Evict the entity named by `removal`.
    ///
    /// Returns `false` when the entity (or its model) was not cached. Model
    /// removal retires every entity of the model first.
    pub fn apply_removal(
        &self,
        removal: RemovalMessage,
    ) -> bool {
        match removal {
            RemovalMessage::Model { model_uuid } => match self.models.remove(&model_uuid) {
                Some((_, model)) => {
                    let evicted = model.retire();
                    info!(model_uuid, evicted, "Model removed from cache");
                    true
                }
                None => false,
            },
            other => match self.model_cache(other.model_uuid()) {
                Some(model) => model.remove(&other),
                None => false,
            },
        }
    }

    fn ensure_model(
        &self,
        model_uuid: &str,
    ) -> Arc<ModelCache> {
        let entry = self.models.entry(model_uuid.to_string()).or_insert_with(|| {
            info!(model_uuid, "Model added to cache");
            Arc::new(ModelCache::new(model_uuid, self.hub.clone(), Arc::clone(&self.gauges)))
        });
        Arc::clone(entry.value())
    }

    /// Cache of one model, for entity reads and watches.
    pub fn model_cache(
        &self,
        model_uuid: &str,
    ) -> Option<Arc<ModelCache>> {
        self.models.get(model_uuid).map(|m| Arc::clone(m.value()))
    }

    /// Snapshot of a model's own details.
    pub fn model(
        &self,
        model_uuid: &str,
    ) -> Option<Model> {
        self.model_cache(model_uuid)?.model()
    }

    /// Snapshots of every populated model, ordered by uuid.
    pub fn models(&self) -> Vec<Model> {
        let mut caches: Vec<Arc<ModelCache>> = self.models.iter().map(|m| Arc::clone(m.value())).collect();
        caches.sort_by(|a, b| a.model_uuid().cmp(b.model_uuid()));
        caches.iter().filter_map(|m| m.model()).collect()
    }

    pub fn watch_model(
        &self,
        model_uuid: &str,
    ) -> Option<Notifier> {
        self.model_cache(model_uuid)?.watch_model()
    }

    /// Mark every resident stale ahead of a full resync. Nothing is
    /// evicted until [`Controller::sweep`].
    pub fn mark_stale(&self) {
        for model in self.models.iter() {
            model.value().mark_stale();
        }
        debug!(models = self.models.len(), "Cache marked stale");
    }

    /// Evict whatever the resync did not refresh. Models still stale are
    /// retired whole. Returns the number of residents evicted.
    pub fn sweep(&self) -> usize {
        let stale: Vec<String> = self
            .models
            .iter()
            .filter(|m| m.value().is_stale())
            .map(|m| m.key().clone())
            .collect();

        let mut evicted = 0;
        for model_uuid in stale {
            if let Some((_, model)) = self.models.remove_if(&model_uuid, |_, m| m.is_stale()) {
                evicted += model.retire();
            }
        }
        let remaining: Vec<Arc<ModelCache>> = self.models.iter().map(|m| Arc::clone(m.value())).collect();
        for model in remaining {
            evicted += model.sweep();
        }

        info!(evicted, "Stale residents swept");
        evicted
    }

    /// Drain `changes` until `shutdown` fires.
    ///
    /// A change that fails to apply is logged and skipped; it never stops
    /// the loop.
    ///
    /// # Errors
    /// `StreamError::Terminated` if the feed closes before shutdown.
    pub async fn run(
        &self,
        mut changes: ChangeReceiver,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        info!("Cache change loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Cache change loop shutting down");
                    return Ok(());
                }
                event = changes.recv() => {
                    let Some(event) = event else {
                        warn!("Change feed closed without shutdown");
                        return Err(StreamError::Terminated.into());
                    };
                    if let Err(e) = self.apply(event) {
                        warn!(error = %e, "Change skipped");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Controller").field("models", &self.models.len()).finish()
    }
}
