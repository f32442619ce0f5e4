use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::hub::Hub;
use crate::hub::HubMessage;
use crate::hub::Subscription;
use crate::CacheSettings;
use crate::Controller;
use crate::ControllerGauges;
use crate::HubConfig;

pub(crate) const MODEL_UUID: &str = "deadbeef-0bad-400d-8000-4b1d0d06f00d";

/// Long enough for a dispatch task to run on a loaded CI box.
pub(crate) const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Short wait used to assert that nothing arrives.
pub(crate) const QUIET_PERIOD: Duration = Duration::from_millis(100);

pub(crate) fn test_gauges() -> Arc<ControllerGauges> {
    Arc::new(ControllerGauges::new())
}

pub(crate) fn test_hub() -> Hub {
    Hub::new(HubConfig::default(), test_gauges()).expect("hub runtime")
}

pub(crate) fn test_controller() -> Controller {
    Controller::new(&CacheSettings::default(), test_gauges()).expect("hub runtime")
}

/// Forward every message published on `topic` into a channel.
pub(crate) fn capture(
    hub: &Hub,
    topic: &str,
) -> (Subscription, Receiver<HubMessage>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let subscription = hub.subscribe(topic, move |_topic, message| {
        let _ = tx.send(message.clone());
    });
    (subscription, rx)
}

/// Drain whatever `rx` receives within the quiet period.
pub(crate) fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    let mut received = Vec::new();
    while let Ok(message) = rx.recv_timeout(QUIET_PERIOD) {
        received.push(message);
    }
    received
}
