//! Change notifiers with a two-phase first-event protocol.
//!
//! A notifier carries coalescing "something changed" signals: its channel
//! holds at most one pending signal, so any number of changes between two
//! polls read as one. A new notifier starts with one pending signal, the
//! initial event.
//!
//! Remote facades have no way to transmit that initial event, so they
//! [`Notifier::arm`] the notifier before registering it. Arming drains the
//! pending signal, and the armed notifier's first poll only reports changes
//! that happened after the watch was set up.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use super::Watcher;
use crate::CleanupHandle;
use crate::WatcherError;

pub(crate) const REASON_REMOVED: &str = "entity removed";
pub(crate) const REASON_STOPPED: &str = "stopped";
const REASON_CLOSED: &str = "notifier closed";

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_notifier_id() -> u64 {
    NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) type NotifySender = mpsc::Sender<()>;

/// Signal channel with the initial event already queued.
pub(crate) fn signal_channel() -> (NotifySender, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(());
    (tx, rx)
}

/// Coalescing send: a full channel already carries a pending signal.
pub(crate) fn signal(tx: &NotifySender) {
    let _ = tx.try_send(());
}

#[derive(Debug, Default)]
struct NotifierState {
    terminal: Mutex<Option<WatcherError>>,
}

impl NotifierState {
    /// First reason wins.
    fn close(
        &self,
        reason: &str,
    ) {
        let mut terminal = self.terminal.lock();
        if terminal.is_none() {
            *terminal = Some(WatcherError::closed(reason));
        }
    }

    fn terminal(&self) -> Option<WatcherError> {
        self.terminal.lock().clone()
    }
}

/// A freshly created, not yet armed notifier.
///
/// It exposes no polling: hand it to a local consumer via
/// [`Notifier::changed`], or arm it for remote polling.
#[derive(Debug)]
pub struct Notifier {
    id: u64,
    label: String,
    receiver: mpsc::Receiver<()>,
    state: Arc<NotifierState>,
    cleanup: CleanupHandle,
}

impl Notifier {
    /// Wrap `receiver`. `on_release` tears down the sending side and runs
    /// exactly once, on `stop()` or on eviction of the owning resident.
    pub(crate) fn new(
        id: u64,
        label: impl Into<String>,
        receiver: mpsc::Receiver<()>,
        on_release: impl FnOnce() + Send + 'static,
    ) -> Self {
        let label = label.into();
        let state = Arc::new(NotifierState::default());

        let release_state = Arc::clone(&state);
        let cleanup = CleanupHandle::new(format!("notifier-{id}:{label}"), move || {
            // A no-op when stop() already recorded its reason.
            release_state.close(REASON_REMOVED);
            on_release();
        });

        trace!(notifier_id = id, label = %label, "Notifier created");

        Self {
            id,
            label,
            receiver,
            state,
            cleanup,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Handle the owning resident keeps for eviction-triggered cleanup.
    pub(crate) fn cleanup_handle(&self) -> CleanupHandle {
        self.cleanup.clone()
    }

    /// Wait for the next signal, including the initial event.
    pub async fn changed(&mut self) -> Result<(), WatcherError> {
        match self.receiver.recv().await {
            Some(()) => Ok(()),
            None => Err(self.terminal_or_closed()),
        }
    }

    /// Terminal error, once the notifier has been stopped or its entity
    /// removed.
    pub fn err(&self) -> Option<WatcherError> {
        self.state.terminal()
    }

    /// Cancel the notifier. Idempotent, and never releases twice even
    /// when racing an eviction.
    pub fn stop(&self) {
        self.state.close(REASON_STOPPED);
        if self.cleanup.release() {
            trace!(notifier_id = self.id, "Notifier stopped");
        }
    }

    /// Drain the pending initial signal and prepare for external polling.
    ///
    /// # Errors
    /// The terminal error if the notifier was closed before arming.
    pub fn arm(mut self) -> Result<ArmedNotifier, WatcherError> {
        if let Some(err) = self.state.terminal() {
            return Err(err);
        }
        match self.receiver.try_recv() {
            Ok(()) | Err(TryRecvError::Empty) => {
                trace!(notifier_id = self.id, "Notifier armed");
                Ok(ArmedNotifier { inner: self })
            }
            Err(TryRecvError::Disconnected) => Err(self.terminal_or_closed()),
        }
    }

    fn terminal_or_closed(&self) -> WatcherError {
        self.state.terminal().unwrap_or_else(|| WatcherError::closed(REASON_CLOSED))
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A notifier whose initial event has been consumed.
#[derive(Debug)]
pub struct ArmedNotifier {
    inner: Notifier,
}

impl ArmedNotifier {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Non-blocking check for a pending change.
    ///
    /// `Ok(true)` consumes the pending signal; `Ok(false)` means nothing
    /// changed since the last poll.
    pub fn poll(&mut self) -> Result<bool, WatcherError> {
        match self.inner.receiver.try_recv() {
            Ok(()) => Ok(true),
            Err(TryRecvError::Empty) => match self.inner.state.terminal() {
                Some(err) => Err(err),
                None => Ok(false),
            },
            Err(TryRecvError::Disconnected) => Err(self.inner.terminal_or_closed()),
        }
    }

    pub async fn changed(&mut self) -> Result<(), WatcherError> {
        self.inner.changed().await
    }

    pub fn stop(&self) {
        self.inner.stop()
    }

    pub fn err(&self) -> Option<WatcherError> {
        self.inner.err()
    }
}

impl Watcher for ArmedNotifier {
    fn poll(&mut self) -> Result<bool, WatcherError> {
        ArmedNotifier::poll(self)
    }

    fn stop(&self) {
        ArmedNotifier::stop(self)
    }

    fn err(&self) -> Option<WatcherError> {
        ArmedNotifier::err(self)
    }
}

/// Senders of every notifier watching one entity.
#[derive(Debug, Default)]
pub(crate) struct NotifierSet {
    senders: Mutex<HashMap<u64, NotifySender>>,
}

impl NotifierSet {
    /// Create a notifier fed by this set. The caller registers its cleanup
    /// handle with the owning resident.
    pub(crate) fn create(
        self: &Arc<Self>,
        label: impl Into<String>,
    ) -> Notifier {
        let id = next_notifier_id();
        let (tx, rx) = signal_channel();
        self.senders.lock().insert(id, tx);

        let set = Arc::clone(self);
        Notifier::new(id, label, rx, move || {
            set.senders.lock().remove(&id);
        })
    }

    pub(crate) fn notify(&self) {
        for tx in self.senders.lock().values() {
            signal(tx);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.lock().len()
    }
}
