use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    /// Capacity of each subscriber's dispatch queue.
    ///
    /// `0` means unbounded. With a bounded queue, a publish that finds the
    /// queue full drops the message for that subscriber only, so one slow
    /// handler never stalls change application.
    ///
    /// **Default**: 0
    #[serde(default = "default_subscriber_queue_size")]
    pub subscriber_queue_size: usize,

    /// Worker threads shared by every subscriber's dispatch task.
    ///
    /// Subscriptions are tasks, not threads, so this bounds the hub's thread
    /// count regardless of how many watchers are live.
    ///
    /// **Default**: 2
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_size: default_subscriber_queue_size(),
            dispatch_workers: default_dispatch_workers(),
        }
    }
}

impl HubConfig {
    /// # Errors
    /// Returns `Error::InvalidConfig` when `dispatch_workers` is 0
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_workers == 0 {
            return Err(Error::InvalidConfig(
                "hub.dispatch_workers must be greater than 0".into(),
            ));
        }
        if self.subscriber_queue_size > 0 && self.subscriber_queue_size < 16 {
            tracing::warn!(
                "hub.subscriber_queue_size ({}) is very small; bursts of structural changes will be dropped",
                self.subscriber_queue_size
            );
        }
        Ok(())
    }
}

fn default_subscriber_queue_size() -> usize {
    0
}

fn default_dispatch_workers() -> usize {
    2
}
