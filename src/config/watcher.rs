use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Shortest handle a registry hands out; shorter configured lengths are raised
/// to this.
pub(crate) const MIN_HANDLE_LENGTH: usize = 8;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Maximum number of live watchers held by a registry
    #[serde(default = "default_max_watchers")]
    pub max_watchers: usize,

    /// Length of the opaque handle strings handed to remote callers
    #[serde(default = "default_handle_length")]
    pub handle_length: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_watchers: default_max_watchers(),
            handle_length: default_handle_length(),
        }
    }
}

impl WatcherConfig {
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - `max_watchers` is 0
    /// - `handle_length` is shorter than 8 characters
    pub fn validate(&self) -> Result<()> {
        if self.max_watchers == 0 {
            return Err(Error::InvalidConfig(
                "watcher.max_watchers must be greater than 0".into(),
            ));
        }
        if self.handle_length < MIN_HANDLE_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "watcher.handle_length {} is too short (minimum {MIN_HANDLE_LENGTH})",
                self.handle_length
            )));
        }
        Ok(())
    }
}

fn default_max_watchers() -> usize {
    10_000
}

fn default_handle_length() -> usize {
    21
}
