use super::{Broadcaster, LocalChannels, Metrics};
use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::config::BroadcastConfig;
use crate::domain::event::{Channel, Envelope};
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

const CHANNEL_PREFIX: &str = "chat:";

/// Broadcaster shared by every node: events go out through Redis pubsub and
/// each node routes what it receives to its local subscribers.
#[derive(Debug)]
pub struct DistributedBroadcaster {
    channels: LocalChannels,
    redis: Arc<RedisClient>,
}

impl DistributedBroadcaster {
    /// Subscribes to the `chat:*` pattern and starts the local dispatcher.
    ///
    /// # Errors
    /// Returns an error if the initial pattern subscription cannot be established.
    pub async fn new(
        redis: Arc<RedisClient>,
        config: &BroadcastConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let channels = LocalChannels::new(config.channel_capacity, Metrics::new());
        channels.spawn_gc(config.gc_interval_secs, shutdown.clone());

        let rx = redis.psubscribe(&format!("{CHANNEL_PREFIX}*")).await?;
        tokio::spawn(
            Self::dispatch(channels.clone(), rx, shutdown).instrument(tracing::info_span!("broadcast_dispatcher")),
        );

        Ok(Self { channels, redis })
    }

    async fn dispatch(
        channels: LocalChannels,
        mut rx: broadcast::Receiver<PubSubMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                msg = rx.recv() => match msg {
                    Ok(msg) => {
                        if let Some(envelope) = decode(&msg) {
                            channels.deliver(Arc::new(envelope));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Broadcast dispatcher lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::error!("Pubsub listener stopped, dispatcher exiting");
                        break;
                    }
                },
            }
        }
    }
}

fn decode(msg: &PubSubMessage) -> Option<Envelope> {
    let Some(name) = msg.channel.strip_prefix(CHANNEL_PREFIX) else {
        tracing::debug!(channel = %msg.channel, "Ignoring pubsub message outside the chat namespace");
        return None;
    };
    match serde_json::from_slice::<Envelope>(&msg.payload) {
        Ok(envelope) if envelope.channel.as_str() == name => Some(envelope),
        Ok(envelope) => {
            tracing::warn!(channel = %name, envelope_channel = %envelope.channel, "Envelope channel mismatch");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, channel = %name, "Dropping undecodable pubsub payload");
            None
        }
    }
}

#[async_trait]
impl Broadcaster for DistributedBroadcaster {
    async fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<Envelope>> {
        self.channels.subscribe(channel)
    }

    #[tracing::instrument(skip(self, envelope), fields(channel = %envelope.channel))]
    async fn publish(&self, envelope: Envelope) {
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode event");
                self.channels.metrics.published_total.add(1, &[KeyValue::new("status", "error")]);
                return;
            }
        };

        let topic = format!("{CHANNEL_PREFIX}{}", envelope.channel);
        let status = match self.redis.publish(&topic, &payload).await {
            Ok(()) => "published",
            Err(e) => {
                tracing::warn!(error = %e, "Failed to publish event");
                "error"
            }
        };
        self.channels.metrics.published_total.add(1, &[KeyValue::new("status", status)]);
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.redis.ping().await
    }
}
