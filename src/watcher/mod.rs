//! Resident-driven change watchers and the surface that hands them to
//! remote callers.
//!
//! - [`Notifier`] / [`ArmedNotifier`]: coalescing change signals for one
//!   entity or one collection, torn down with the resident that owns them.
//! - [`WatcherRegistry`]: explicit, process-wide table of opaque handles.
//! - [`EntityWatchFacade`]: permission-checking boundary that arms
//!   notifiers and registers them.

mod facade;
mod notifier;
mod registry;


pub use facade::*;
pub use notifier::ArmedNotifier;
pub use notifier::Notifier;
pub(crate) use notifier::next_notifier_id;
pub(crate) use notifier::signal;
pub(crate) use notifier::signal_channel;
pub(crate) use notifier::NotifierSet;
pub use registry::*;

#[cfg(test)]
use mockall::automock;

use crate::WatcherError;

/// Shape the registry expects of a pollable watcher.
#[cfg_attr(test, automock)]
pub trait Watcher: Send + 'static {
    /// `Ok(true)` when something changed since the previous poll.
    fn poll(&mut self) -> Result<bool, WatcherError>;

    /// Cancel the watcher. Idempotent.
    fn stop(&self);

    /// Terminal error, if the watcher has stopped.
    fn err(&self) -> Option<WatcherError>;
}
