//! In-process publish/subscribe broker for structural-change events.
//!
//! Each subscription owns a dispatch queue drained by its own task on the
//! hub's dispatch runtime, so a slow handler only delays itself and a
//! subscription never costs an OS thread. Publishing never blocks:
//!
//! ```text
//! publish(topic) ── lookup in DashMap ──► try_send(subscriber queue)
//!                                              │
//!                                              ▼
//!                          dispatch task (hub runtime) ─► handler(topic, msg)
//! ```
//!
//! Messages are not retained: a subscriber registered after a publish never
//! sees it. Each subscriber observes a topic's messages in publish order.


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::cache::Application;
use crate::cache::Machine;
use crate::cache::Model;
use crate::cache::Relation;
use crate::cache::RemovalMessage;
use crate::cache::Unit;
use crate::ControllerGauges;
use crate::HubConfig;
use crate::Result;

pub const MODEL_ADD: &str = "model-add";
pub const MODEL_REMOVE: &str = "model-remove";
pub const APPLICATION_ADD: &str = "application-add";
pub const APPLICATION_REMOVE: &str = "application-remove";
pub const MACHINE_ADD: &str = "machine-add";
pub const MACHINE_REMOVE: &str = "machine-remove";
pub const UNIT_ADD: &str = "unit-add";
pub const UNIT_REMOVE: &str = "unit-remove";
pub const RELATION_ADD: &str = "relation-add";
pub const RELATION_REMOVE: &str = "relation-remove";

/// Payload carried by the hub. Entity payloads are detached snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Model(Model),
    Application(Application),
    Machine(Machine),
    Unit(Unit),
    Relation(Relation),
    Removed(RemovalMessage),
}

impl HubMessage {
    /// UUID of the model the payload belongs to.
    pub fn model_uuid(&self) -> &str {
        match self {
            HubMessage::Model(m) => m.model_uuid(),
            HubMessage::Application(a) => a.model_uuid(),
            HubMessage::Machine(m) => m.model_uuid(),
            HubMessage::Unit(u) => u.model_uuid(),
            HubMessage::Relation(r) => r.model_uuid(),
            HubMessage::Removed(r) => r.model_uuid(),
        }
    }
}

type Delivery = Arc<HubMessage>;

/// Sending half of a subscriber's dispatch queue.
#[derive(Debug)]
enum DispatchSender {
    Bounded(mpsc::Sender<Delivery>),
    Unbounded(mpsc::UnboundedSender<Delivery>),
}

impl DispatchSender {
    fn try_send(
        &self,
        message: Delivery,
    ) -> std::result::Result<(), TrySendError<Delivery>> {
        match self {
            DispatchSender::Bounded(tx) => tx.try_send(message),
            DispatchSender::Unbounded(tx) => tx.send(message).map_err(|e| TrySendError::Closed(e.0)),
        }
    }
}

#[derive(Debug)]
enum DispatchReceiver {
    Bounded(mpsc::Receiver<Delivery>),
    Unbounded(mpsc::UnboundedReceiver<Delivery>),
}

impl DispatchReceiver {
    async fn recv(&mut self) -> Option<Delivery> {
        match self {
            DispatchReceiver::Bounded(rx) => rx.recv().await,
            DispatchReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

fn dispatch_queue(queue_size: usize) -> (DispatchSender, DispatchReceiver) {
    if queue_size > 0 {
        let (tx, rx) = mpsc::channel(queue_size);
        (DispatchSender::Bounded(tx), DispatchReceiver::Bounded(rx))
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        (DispatchSender::Unbounded(tx), DispatchReceiver::Unbounded(rx))
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: DispatchSender,
}

#[derive(Debug)]
struct HubInner {
    /// Subscribers grouped by topic
    topics: DashMap<String, Vec<Subscriber>>,

    /// Next subscription ID (monotonically increasing)
    next_id: AtomicU64,

    /// Runs every subscriber's dispatch task on a fixed set of worker threads
    dispatch: Option<Runtime>,

    config: HubConfig,

    gauges: Arc<ControllerGauges>,
}

impl Drop for HubInner {
    fn drop(&mut self) {
        // Never wait for handlers: the last hub reference may be dropped
        // from async code, where a blocking runtime shutdown panics.
        if let Some(runtime) = self.dispatch.take() {
            runtime.shutdown_background();
            debug!("Hub dispatch runtime stopped");
        }
    }
}

/// Cheaply cloneable handle to a shared broker.
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Start a broker with `config.dispatch_workers` dispatch threads.
    ///
    /// # Errors
    /// `Error::IoError` if the dispatch threads cannot be started.
    pub fn new(
        config: HubConfig,
        gauges: Arc<ControllerGauges>,
    ) -> Result<Self> {
        let dispatch = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.dispatch_workers.max(1))
            .thread_name("fleet-cache-hub")
            .build()?;
        debug!(workers = config.dispatch_workers.max(1), "Hub dispatch runtime started");

        Ok(Self {
            inner: Arc::new(HubInner {
                topics: DashMap::new(),
                next_id: AtomicU64::new(1),
                dispatch: Some(dispatch),
                config,
                gauges,
            }),
        })
    }

    /// Deliver `message` to every current subscriber of `topic`.
    ///
    /// Returns the number of subscriber queues that accepted the message.
    pub fn publish(
        &self,
        topic: &str,
        message: HubMessage,
    ) -> usize {
        let Some(subscribers) = self.inner.topics.get(topic) else {
            trace!(topic, "Publish with no subscribers");
            return 0;
        };

        let message = Arc::new(message);
        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            match subscriber.sender.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.gauges.hub_dropped.inc();
                    warn!(
                        topic,
                        subscription_id = subscriber.id,
                        "Subscriber queue full, message dropped"
                    );
                }
                // Dispatch task gone (handler panicked); unsubscribe pending.
                Err(TrySendError::Closed(_)) => {}
            }
        }

        trace!(topic, delivered, "Message published");
        delivered
    }

    /// Register `handler` for `topic`.
    ///
    /// The handler runs in its own dispatch task on the hub's worker threads
    /// and must not block for long: a blocked handler pins one worker.
    /// Dropping the returned [`Subscription`] unsubscribes; messages already
    /// queued may still be delivered, none are delivered twice.
    pub fn subscribe<F>(
        &self,
        topic: &str,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&str, &HubMessage) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = dispatch_queue(self.inner.config.subscriber_queue_size);

        if let Some(dispatch) = &self.inner.dispatch {
            let task_topic = topic.to_string();
            dispatch.spawn(async move {
                trace!(subscription_id = id, topic = %task_topic, "Dispatch task started");
                while let Some(message) = receiver.recv().await {
                    handler(&task_topic, &message);
                }
                trace!(subscription_id = id, topic = %task_topic, "Dispatch task stopped");
            });
        }

        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        trace!(subscription_id = id, topic, "Subscribed");

        Subscription {
            cleanup: Some(SubscriptionCleanup {
                id,
                topic: topic.to_string(),
                hub: Arc::clone(&self.inner),
            }),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.inner.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }
}

#[derive(Debug)]
struct SubscriptionCleanup {
    id: u64,
    topic: String,
    hub: Arc<HubInner>,
}

/// Registration of one handler on one topic. Unsubscribes when dropped.
#[derive(Debug)]
pub struct Subscription {
    cleanup: Option<SubscriptionCleanup>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.cleanup.as_ref().map(|c| c.id).unwrap_or_default()
    }

    /// Explicit form of dropping the subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            // Atomically drop the subscriber and the topic entry once it is
            // empty, so a concurrent subscribe never lands in a removed list.
            cleanup.hub.topics.remove_if_mut(&cleanup.topic, |_topic, subscribers| {
                subscribers.retain(|s| s.id != cleanup.id);
                subscribers.is_empty()
            });
            trace!(subscription_id = cleanup.id, topic = %cleanup.topic, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
