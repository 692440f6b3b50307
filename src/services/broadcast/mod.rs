use crate::config::BroadcastConfig;
use crate::domain::event::{Channel, Envelope};
use async_trait::async_trait;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

pub mod distributed;

pub use distributed::DistributedBroadcaster;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) published_total: Counter<u64>,
    pub(crate) unrouted_total: Counter<u64>,
    pub(crate) active_channels: UpDownCounter<i64>,
    pub(crate) gc_duration_seconds: Histogram<f64>,
    pub(crate) gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            published_total: meter
                .u64_counter("broadcast_published_total")
                .with_description("Total events published, by status")
                .build(),
            unrouted_total: meter
                .u64_counter("broadcast_unrouted_total")
                .with_description("Events with no local subscribers")
                .build(),
            active_channels: meter
                .i64_up_down_counter("broadcast_active_channels")
                .with_description("Number of local channels with a sender")
                .build(),
            gc_duration_seconds: meter
                .f64_histogram("broadcast_gc_duration_seconds")
                .with_description("Time taken to perform a single GC iteration")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("broadcast_gc_reclaimed_total")
                .with_description("Total number of idle channels reclaimed by GC")
                .build(),
        }
    }
}

/// Publish/subscribe fan-out of chat events. Delivery is at-most-once and
/// best effort: publish never fails the caller.
#[async_trait]
pub trait Broadcaster: Send + Sync + std::fmt::Debug {
    /// Returns a receiver for every event published on `channel` from now on.
    async fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<Envelope>>;

    /// Publishes an event to all current subscribers of its channel.
    async fn publish(&self, envelope: Envelope);

    /// Checks the backing transport.
    ///
    /// # Errors
    /// Returns an error if the transport is unreachable.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Node-local routing table from channel name to a tokio broadcast sender.
#[derive(Clone, Debug)]
pub(crate) struct LocalChannels {
    senders: Arc<DashMap<Channel, broadcast::Sender<Arc<Envelope>>>>,
    capacity: usize,
    metrics: Metrics,
}

impl LocalChannels {
    pub(crate) fn new(capacity: usize, metrics: Metrics) -> Self {
        Self { senders: Arc::new(DashMap::new()), capacity: capacity.max(1), metrics }
    }

    pub(crate) fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<Envelope>> {
        self.senders
            .entry(channel.clone())
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[]);
                broadcast::channel(self.capacity).0
            })
            .value()
            .subscribe()
    }

    /// Hands an envelope to local subscribers. Returns whether anyone was listening.
    pub(crate) fn deliver(&self, envelope: Arc<Envelope>) -> bool {
        let Some(tx) = self.senders.get(&envelope.channel) else {
            self.metrics.unrouted_total.add(1, &[]);
            return false;
        };
        tx.send(envelope).is_ok()
    }

    /// Drops senders that have no receivers left.
    pub(crate) fn collect_garbage(&self) -> u64 {
        let mut reclaimed = 0;
        self.senders.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[]);
                reclaimed += 1;
            }
            active
        });
        reclaimed
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }

    pub(crate) fn spawn_gc(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let channels = self.clone();
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let start = std::time::Instant::now();
                            let reclaimed = channels.collect_garbage();
                            channels.metrics.gc_duration_seconds.record(start.elapsed().as_secs_f64(), &[]);
                            if reclaimed > 0 {
                                tracing::debug!(reclaimed, "Reclaimed idle broadcast channels");
                                channels.metrics.gc_reclaimed_total.add(reclaimed, &[]);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }
            .instrument(tracing::info_span!("broadcast_gc")),
        );
    }
}

/// Single-node broadcaster: publishing delivers straight to local subscribers.
#[derive(Debug)]
pub struct InMemoryBroadcaster {
    channels: LocalChannels,
}

impl InMemoryBroadcaster {
    #[must_use]
    pub fn new(config: &BroadcastConfig, shutdown: watch::Receiver<bool>) -> Self {
        let channels = LocalChannels::new(config.channel_capacity, Metrics::new());
        channels.spawn_gc(config.gc_interval_secs, shutdown);
        Self { channels }
    }
}

#[async_trait]
impl Broadcaster for InMemoryBroadcaster {
    async fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<Envelope>> {
        self.channels.subscribe(channel)
    }

    #[tracing::instrument(skip(self, envelope), fields(channel = %envelope.channel))]
    async fn publish(&self, envelope: Envelope) {
        let delivered = self.channels.deliver(Arc::new(envelope));
        let status = if delivered { "delivered" } else { "unrouted" };
        self.channels.metrics.published_total.add(1, &[KeyValue::new("status", status)]);
    }
}
