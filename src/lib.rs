//! Concurrent in-memory mirror of controller model state.
//!
//! The cache is fed complete entity snapshots from the authoritative store,
//! fans structural changes out over an in-process [`Hub`], and owns the
//! lifecycle of every watcher handed to remote callers so none outlives the
//! entity it observes.
//!
//! ```ignore
//! let settings = CacheSettings::load(None)?;
//! let controller = Arc::new(Controller::new(&settings, Arc::new(ControllerGauges::new()))?);
//! let (changes, feed) = change_feed(&settings.stream);
//! let (_shutdown_tx, shutdown) = tokio::sync::watch::channel(());
//! tokio::spawn({
//!     let controller = Arc::clone(&controller);
//!     async move { controller.run(feed, shutdown).await }
//! });
//! ```

mod cache;
mod config;
mod errors;
mod metrics;
pub mod hub;
mod watcher;

pub use cache::*;
pub use config::*;
pub use errors::*;
pub use hub::Hub;
pub use hub::HubMessage;
pub use hub::Subscription;
pub use metrics::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
