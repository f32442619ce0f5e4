use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    /// Capacity of the change feed between the authoritative store and
    /// the cache. Producers wait when it is full.
    #[serde(default = "default_change_queue_size")]
    pub change_queue_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            change_queue_size: default_change_queue_size(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.change_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "stream.change_queue_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_change_queue_size() -> usize {
    1024
}
