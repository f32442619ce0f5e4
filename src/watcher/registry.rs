use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Watcher;
use crate::config::MIN_HANDLE_LENGTH;
use crate::WatcherConfig;
use crate::WatcherError;

/// Table of live watchers keyed by opaque handle.
///
/// Constructed once at startup and passed by reference to whatever builds
/// the API surface.
pub struct WatcherRegistry {
    watchers: DashMap<String, Mutex<Box<dyn Watcher>>>,

    /// Slots taken by registered or in-flight watchers, checked against
    /// `max_watchers` before a handle is generated
    reserved: AtomicUsize,

    config: WatcherConfig,
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("watchers", &self.watchers.len())
            .field("reserved", &self.reserved)
            .field("config", &self.config)
            .finish()
    }
}

impl WatcherRegistry {
    /// Handles shorter than the minimum length are raised to it.
    pub fn new(mut config: WatcherConfig) -> Self {
        if config.handle_length < MIN_HANDLE_LENGTH {
            warn!(
                configured = config.handle_length,
                minimum = MIN_HANDLE_LENGTH,
                "Watcher handle length too short, using minimum"
            );
            config.handle_length = MIN_HANDLE_LENGTH;
        }
        Self {
            watchers: DashMap::new(),
            reserved: AtomicUsize::new(0),
            config,
        }
    }

    /// Take ownership of `watcher` and return its handle.
    ///
    /// # Errors
    /// `WatcherError::RegistryFull` at capacity; the watcher is stopped.
    pub fn register(
        &self,
        watcher: Box<dyn Watcher>,
    ) -> Result<String, WatcherError> {
        let limit = self.config.max_watchers;
        if self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .is_err()
        {
            watcher.stop();
            return Err(WatcherError::RegistryFull { limit });
        }

        let handle_length = self.config.handle_length;
        let id = loop {
            let candidate = nanoid::nanoid!(handle_length);
            // Claim the handle in the same step as checking it is free.
            if let Entry::Vacant(slot) = self.watchers.entry(candidate) {
                let id = slot.key().clone();
                slot.insert(Mutex::new(watcher));
                break id;
            }
        };

        debug!(watcher_id = %id, "Watcher registered");
        Ok(id)
    }

    /// Poll the watcher behind `id` for a pending change.
    pub fn poll(
        &self,
        id: &str,
    ) -> Result<bool, WatcherError> {
        let entry = self
            .watchers
            .get(id)
            .ok_or_else(|| WatcherError::UnknownHandle { id: id.to_string() })?;
        let result = entry.lock().poll();
        trace!(watcher_id = %id, ?result, "Watcher polled");
        result
    }

    /// Stop and forget the watcher behind `id`.
    pub fn release(
        &self,
        id: &str,
    ) -> Result<(), WatcherError> {
        let (_, watcher) = self
            .watchers
            .remove(id)
            .ok_or_else(|| WatcherError::UnknownHandle { id: id.to_string() })?;
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        watcher.lock().stop();
        debug!(watcher_id = %id, "Watcher released");
        Ok(())
    }

    /// Stop every registered watcher, e.g. when the API connection closes.
    pub fn release_all(&self) -> usize {
        let ids: Vec<String> = self.watchers.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.release(id).is_ok()).count()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}
