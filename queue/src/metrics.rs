//! Metrics for [crate::exclusive::Queue] and the [crate::cursored::Queue] it pages through.

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Queue metrics. Clones share the underlying values.
#[derive(Clone, Default)]
pub struct Metrics {
    /// Elements enqueued and not yet acknowledged.
    pub enqueued_count: Gauge,
    /// Size units reserved against the queue's flow.
    pub enqueued_size: Gauge,
    /// Elements admitted by `add` or `offer`.
    pub accepted: Counter,
    /// Offers turned away by back-pressure.
    pub rejected: Counter,
    /// Elements handed to the consumer.
    pub dispatched: Counter,
    /// Elements acknowledged by the consumer.
    pub acknowledged: Counter,
    /// Elements written to the store to leave memory.
    pub paged_out: Counter,
    /// Elements read back from the store.
    pub paged_in: Counter,
    /// Elements dropped because they expired before delivery.
    pub expired: Counter,
}

impl Metrics {
    /// Create and register metrics with the given registry.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "enqueued_count",
            "Elements enqueued and not yet acknowledged",
            metrics.enqueued_count.clone(),
        );
        registry.register(
            "enqueued_size",
            "Size units reserved against the queue's flow",
            metrics.enqueued_size.clone(),
        );
        registry.register(
            "accepted",
            "Elements admitted into the queue",
            metrics.accepted.clone(),
        );
        registry.register(
            "rejected",
            "Offers rejected by back-pressure",
            metrics.rejected.clone(),
        );
        registry.register(
            "dispatched",
            "Elements handed to the consumer",
            metrics.dispatched.clone(),
        );
        registry.register(
            "acknowledged",
            "Elements acknowledged by the consumer",
            metrics.acknowledged.clone(),
        );
        registry.register(
            "paged_out",
            "Elements written to the store to leave memory",
            metrics.paged_out.clone(),
        );
        registry.register(
            "paged_in",
            "Elements read back from the store",
            metrics.paged_in.clone(),
        );
        registry.register(
            "expired",
            "Elements dropped because they expired before delivery",
            metrics.expired.clone(),
        );
        metrics
    }
}
