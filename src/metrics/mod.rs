//! Controller-wide gauges shared by reference into every cached entity.


use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

use crate::cache::EntityKind;

#[derive(Clone)]
pub struct ControllerGauges {
    /// Live residents per entity kind
    pub residents: IntGaugeVec,
    /// Change records applied per entity kind
    pub changes_applied: IntCounterVec,
    /// Structural-change publishes per entity kind
    pub structural_publishes: IntCounterVec,
    /// Evictions per entity kind
    pub evictions: IntCounterVec,
    /// Hub messages dropped because a subscriber queue was full
    pub hub_dropped: IntCounter,
}

impl ControllerGauges {
    pub fn new() -> Self {
        Self {
            residents: IntGaugeVec::new(
                Opts::new("cache_residents", "Live cached residents"),
                &["kind"],
            )
            .expect("metric can not be created"),
            changes_applied: IntCounterVec::new(
                Opts::new("cache_changes_applied", "Change records applied to the cache"),
                &["kind"],
            )
            .expect("metric can not be created"),
            structural_publishes: IntCounterVec::new(
                Opts::new(
                    "cache_structural_publishes",
                    "Structural changes published to the hub",
                ),
                &["kind"],
            )
            .expect("metric can not be created"),
            evictions: IntCounterVec::new(
                Opts::new("cache_evictions", "Residents evicted from the cache"),
                &["kind"],
            )
            .expect("metric can not be created"),
            hub_dropped: IntCounter::new(
                "cache_hub_dropped",
                "Hub messages dropped on full subscriber queues",
            )
            .expect("metric can not be created"),
        }
    }

    /// Attach every collector to a caller-owned registry.
    pub fn register(
        &self,
        registry: &Registry,
    ) -> prometheus::Result<()> {
        registry.register(Box::new(self.residents.clone()))?;
        registry.register(Box::new(self.changes_applied.clone()))?;
        registry.register(Box::new(self.structural_publishes.clone()))?;
        registry.register(Box::new(self.evictions.clone()))?;
        registry.register(Box::new(self.hub_dropped.clone()))?;
        Ok(())
    }

    pub(crate) fn resident_added(
        &self,
        kind: EntityKind,
    ) {
        self.residents.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn resident_evicted(
        &self,
        kind: EntityKind,
    ) {
        self.residents.with_label_values(&[kind.as_str()]).dec();
        self.evictions.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn change_applied(
        &self,
        kind: EntityKind,
    ) {
        self.changes_applied.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn structural_published(
        &self,
        kind: EntityKind,
    ) {
        self.structural_publishes.with_label_values(&[kind.as_str()]).inc();
    }
}

impl std::fmt::Debug for ControllerGauges {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ControllerGauges")
            .field("hub_dropped", &self.hub_dropped.get())
            .finish_non_exhaustive()
    }
}

impl Default for ControllerGauges {
    fn default() -> Self {
        Self::new()
    }
}
