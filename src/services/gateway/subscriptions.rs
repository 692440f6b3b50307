use crate::domain::event::{Channel, Envelope};
use crate::services::gateway::{Metrics, ServerFrame};
use axum::extract::ws::Message as WsMessage;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;
use uuid::Uuid;

/// A live channel subscription. Dropping it stops the forwarding task.
#[derive(Debug)]
pub(crate) struct SubscriptionGuard {
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionGuard {
    /// Forwards events from `rx` to the socket's outbound queue, skipping those
    /// caused by `user_id` itself.
    pub(crate) fn spawn(
        channel: &Channel,
        user_id: Uuid,
        mut rx: broadcast::Receiver<Arc<Envelope>>,
        outbound_tx: mpsc::Sender<WsMessage>,
        metrics: Metrics,
    ) -> Self {
        let task = tokio::spawn(
            async move {
                loop {
                    let envelope = match rx.recv().await {
                        Ok(envelope) => envelope,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subscription lagged, events dropped");
                            metrics.outbound_dropped_total.add(skipped, &[KeyValue::new("reason", "lagged")]);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if envelope.actor_id == Some(user_id) {
                        continue;
                    }
                    let Some(frame) = ServerFrame::Event(&envelope).encode() else { continue };
                    match outbound_tx.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            metrics.outbound_dropped_total.add(1, &[KeyValue::new("reason", "buffer_full")]);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
            .instrument(tracing::debug_span!("subscription", channel = %channel)),
        );
        Self { task }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The channels one session listens on.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    active: HashMap<Channel, SubscriptionGuard>,
}

impl Subscriptions {
    pub(crate) fn contains(&self, channel: &Channel) -> bool {
        self.active.contains_key(channel)
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    /// Stores a guard, replacing (and so stopping) any previous one for the channel.
    pub(crate) fn insert(&mut self, channel: Channel, guard: SubscriptionGuard) {
        self.active.insert(channel, guard);
    }

    /// Returns whether the channel was subscribed.
    pub(crate) fn remove(&mut self, channel: &Channel) -> bool {
        self.active.remove(channel).is_some()
    }
}
