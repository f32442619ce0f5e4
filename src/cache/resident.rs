//! Lifecycle bookkeeping shared by every cached entity.
//!
//! A [`Resident`] is created lazily (stale, unpopulated), becomes fresh on
//! its first details snapshot, and is evicted exactly once. Eviction drains
//! the registered [`CleanupHandle`]s before the owner drops the collection
//! entry, so no watcher outlives the entity it observes.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::EntityKind;
use super::RemovalMessage;
use crate::CacheError;
use crate::Result;

/// Identity of a resident: entity kind plus natural key, scoped to a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResidentId {
    pub kind: EntityKind,
    pub model_uuid: String,
    pub key: String,
}

impl ResidentId {
    pub fn new(
        kind: EntityKind,
        model_uuid: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            model_uuid: model_uuid.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ResidentId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.model_uuid, self.key)
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

struct CleanupInner {
    label: String,
    release: Mutex<Option<ReleaseFn>>,
}

/// Reference to a dependent resource that must be released exactly once.
///
/// Clones share the same release slot: whichever clone releases first runs
/// the release function, every later call is a no-op. This lets a watcher
/// owner cancel early while the resident keeps its copy for eviction.
#[derive(Clone)]
pub struct CleanupHandle {
    inner: Arc<CleanupInner>,
}

impl CleanupHandle {
    pub fn new(
        label: impl Into<String>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(CleanupInner {
                label: label.into(),
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    /// Run the release function if nobody has yet.
    ///
    /// Returns `true` only for the call that performed the release.
    pub fn release(&self) -> bool {
        // Take under the lock, run outside it: release functions may take
        // other locks.
        let release = self.inner.release.lock().take();
        match release {
            Some(f) => {
                f();
                trace!(label = %self.inner.label, "Cleanup handle released");
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.release.lock().is_none()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("label", &self.inner.label)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Default)]
struct CleanupState {
    evicted: bool,
    handles: Vec<CleanupHandle>,
}

/// Base lifecycle object embedded in every cached entity.
pub struct Resident {
    id: ResidentId,
    stale: AtomicBool,
    removal_message: OnceLock<RemovalMessage>,
    cleanups: Mutex<CleanupState>,
}

impl Resident {
    /// New residents start stale: nothing has populated them yet.
    pub fn new(id: ResidentId) -> Self {
        Self {
            id,
            stale: AtomicBool::new(true),
            removal_message: OnceLock::new(),
            cleanups: Mutex::new(CleanupState::default()),
        }
    }

    pub fn id(&self) -> &ResidentId {
        &self.id
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Idempotent. Never publishes or evicts.
    pub fn mark_stale(&self) {
        self.set_stale(true);
    }

    pub(crate) fn set_stale(
        &self,
        stale: bool,
    ) {
        self.stale.store(stale, Ordering::Release);
    }

    /// The removal message captured from the first details snapshot.
    pub fn removal_message(&self) -> Option<&RemovalMessage> {
        self.removal_message.get()
    }

    /// Capture the removal message unless one is already set.
    pub(crate) fn capture_removal_message(
        &self,
        f: impl FnOnce() -> RemovalMessage,
    ) {
        self.removal_message.get_or_init(f);
    }

    /// Add a dependent resource to release on eviction.
    ///
    /// # Errors
    /// `CacheError::ResidentEvicted` once eviction has begun. The handle is
    /// not released in that case; the caller still owns it.
    pub fn register_cleanup(
        &self,
        handle: CleanupHandle,
    ) -> Result<()> {
        let mut state = self.cleanups.lock();
        if state.evicted {
            return Err(CacheError::ResidentEvicted {
                id: self.id.to_string(),
            }
            .into());
        }
        // Owners that cancelled early leave released handles behind.
        state.handles.retain(|h| !h.is_released());
        state.handles.push(handle);
        Ok(())
    }

    /// Number of registered handles not yet released.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.lock().handles.iter().filter(|h| !h.is_released()).count()
    }

    pub fn is_evicted(&self) -> bool {
        self.cleanups.lock().evicted
    }

    /// Release every cleanup handle and hand back the removal message.
    ///
    /// Only the first call does anything; later calls return `None`.
    pub fn evict(&self) -> Option<RemovalMessage> {
        let handles = {
            let mut state = self.cleanups.lock();
            if state.evicted {
                return None;
            }
            state.evicted = true;
            std::mem::take(&mut state.handles)
        };
        self.set_stale(true);

        let released = handles.iter().filter(|h| h.release()).count();
        debug!(id = %self.id, released, "Resident evicted");

        self.removal_message.get().cloned()
    }
}

impl fmt::Debug for Resident {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Resident")
            .field("id", &self.id)
            .field("stale", &self.is_stale())
            .field("removal_message", &self.removal_message.get())
            .finish_non_exhaustive()
    }
}

/// Uniform lifecycle surface over heterogeneous cached entities.
pub trait CachedResident: Send + Sync {
    fn resident(&self) -> &Resident;

    fn id(&self) -> &ResidentId {
        self.resident().id()
    }

    fn is_stale(&self) -> bool {
        self.resident().is_stale()
    }

    fn mark_stale(&self) {
        self.resident().mark_stale()
    }

    fn register_cleanup(
        &self,
        handle: CleanupHandle,
    ) -> Result<()> {
        self.resident().register_cleanup(handle)
    }

    fn evict(&self) -> Option<RemovalMessage> {
        self.resident().evict()
    }
}
