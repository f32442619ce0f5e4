//! Cache Error Hierarchy
//!
//! Defines the error types for the model cache, categorized by the layer
//! that raises them: configuration, cache core, watchers and the upstream
//! change stream.
//!
//! Not-found is never an error for snapshot reads or removals; those return
//! `Option`/`bool`.

use config::ConfigError;

use crate::cache::EntityKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration source or deserialization failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that deserialized but failed validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Hub dispatch threads could not be started
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Cache core failures, scoped to a single change or resident
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Watcher lifecycle and registry failures
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    /// Upstream change stream failures, reported to the cache owner
    #[error(transparent)]
    Stream(#[from] StreamError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Cleanup registration or a details update reached a resident whose
    /// eviction has already begun.
    #[error("Resident {id} has been evicted")]
    ResidentEvicted { id: String },

    /// The incoming change record cannot be applied
    #[error("Malformed {kind} change for {key:?}: {reason}")]
    MalformedChange {
        kind: EntityKind,
        key: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatcherError {
    /// Terminal error of a notifier whose channel has been closed
    #[error("Watcher closed: {reason}")]
    Closed { reason: String },

    /// No watcher registered under this handle
    #[error("Unknown watcher handle: {id}")]
    UnknownHandle { id: String },

    /// Registry capacity exhausted
    #[error("Watcher registry full ({limit} watchers)")]
    RegistryFull { limit: usize },

    #[error("Permission denied")]
    PermissionDenied,

    /// Watched entity is absent (or stale) in the cache
    #[error("{kind} {key:?} not found")]
    NotFound { kind: EntityKind, key: String },

    /// Malformed entity tag supplied by a remote caller
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The change feed closed without a shutdown signal
    #[error("Change stream terminated unexpectedly")]
    Terminated,
}

impl WatcherError {
    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        WatcherError::Closed {
            reason: reason.into(),
        }
    }
}
