use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct RedisClient {
    publisher: redis::aio::ConnectionManager,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    config: PubSubConfig,
}

impl RedisClient {
    /// Connects the publisher half of the pubsub client.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(
        url: &str,
        config: &PubSubConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        Ok(Arc::new(Self { publisher, client, shutdown, channel_capacity, config: config.clone() }))
    }

    /// Pattern-subscribes and returns a local receiver fed by a background
    /// listener that reconnects with exponential backoff until shutdown.
    ///
    /// # Errors
    /// Returns an error if the listener exits before the first subscription succeeds.
    pub async fn psubscribe(&self, pattern: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        let (tx, rx) = broadcast::channel(self.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(
            Self::run_pattern_listener(
                self.client.clone(),
                pattern.to_string(),
                tx,
                self.shutdown.clone(),
                self.config.clone(),
                ready_tx,
            )
            .instrument(tracing::info_span!("pubsub_listener", pattern = %pattern)),
        );

        ready_rx.await.map_err(|_| anyhow::anyhow!("pubsub listener for {pattern} exited before subscribing"))?;

        Ok(rx)
    }

    async fn run_pattern_listener(
        client: redis::Client,
        pattern: String,
        tx: broadcast::Sender<PubSubMessage>,
        mut shutdown: watch::Receiver<bool>,
        config: PubSubConfig,
        ready_tx: oneshot::Sender<()>,
    ) {
        let mut ready_tx = Some(ready_tx);

        loop {
            let retry_strategy = ExponentialBuilder::default()
                .with_min_delay(std::time::Duration::from_secs(config.min_backoff_secs))
                .with_max_delay(std::time::Duration::from_secs(config.max_backoff_secs));

            let pubsub_result = (|| async {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.psubscribe(&pattern).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(retry_strategy)
            .notify(|e, duration| {
                tracing::warn!(error = %e, retry_in = ?duration, "Failed to subscribe to pubsub, retrying");
            })
            .await;

            let pubsub = match pubsub_result {
                Ok(ps) => ps,
                Err(e) => {
                    tracing::error!(error = %e, "Pubsub subscription failed after retries");
                    return;
                }
            };

            tracing::info!(pattern = %pattern, "Subscribed to pubsub");
            if let Some(rtx) = ready_tx.take() {
                let _ = rtx.send(());
            }

            let mut message_stream = pubsub.into_on_message();

            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    msg = message_stream.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!(pattern = %pattern, "Pubsub connection lost, reconnecting");
                            break;
                        };
                        let pubsub_msg = PubSubMessage {
                            channel: msg.get_channel_name().to_string(),
                            payload: msg.get_payload().unwrap_or_default(),
                        };
                        // No local receivers is not an error; the dispatcher may be restarting.
                        let _ = tx.send(pubsub_msg);
                    }
                }
            }

            if *shutdown.borrow() {
                return;
            }
        }
    }

    /// Publishes a raw payload on a channel.
    ///
    /// # Errors
    /// Returns an error if the publish fails.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
