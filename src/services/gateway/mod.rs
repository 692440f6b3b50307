pub(crate) mod session;
pub(crate) mod subscriptions;

use crate::adapters::database::DbPool;
use crate::config::WsConfig;
use crate::domain::event::{Channel, Envelope};
use crate::domain::user::UserSummary;
use crate::services::access::AccessPolicy;
use crate::services::broadcast::Broadcaster;
use crate::services::gateway::session::Session;
use crate::services::presence_service::PresenceService;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) outbound_dropped_total: Counter<u64>,
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) subscriptions_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            outbound_dropped_total: meter
                .u64_counter("websocket_outbound_dropped_total")
                .with_description("Total events dropped before reaching a socket")
                .build(),
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            subscriptions_total: meter
                .u64_counter("websocket_subscriptions_total")
                .with_description("Subscription requests, by outcome")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

/// Replies to client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ControlFrame {
    Subscribed { channel: Channel },
    Unsubscribed { channel: Channel },
    Error { channel: Option<String>, reason: String },
}

/// Everything the server writes to a socket: an event envelope or a control reply.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ServerFrame<'a> {
    Event(&'a Envelope),
    Control(ControlFrame),
}

impl ServerFrame<'_> {
    pub(crate) fn encode(&self) -> Option<WsMessage> {
        match serde_json::to_string(self) {
            Ok(json) => Some(WsMessage::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode gateway frame");
                None
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    pool: DbPool,
    access: AccessPolicy,
    broadcaster: Arc<dyn Broadcaster>,
    presence: PresenceService,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        access: AccessPolicy,
        broadcaster: Arc<dyn Broadcaster>,
        presence: PresenceService,
        config: WsConfig,
    ) -> Self {
        Self { pool, access, broadcaster, presence, config, metrics: Metrics::new() }
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        user: UserSummary,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session = Session {
            user,
            request_id,
            socket,
            pool: self.pool.clone(),
            access: self.access.clone(),
            broadcaster: Arc::clone(&self.broadcaster),
            presence: self.presence.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frames_parse() {
        let frame: ClientFrame = serde_json::from_value(json!({"type": "subscribe", "channel": "online"})).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe { channel: "online".into() });

        assert!(serde_json::from_value::<ClientFrame>(json!({"type": "whisper", "channel": "online"})).is_err());
    }

    #[test]
    fn test_control_frames_are_tagged() {
        let frame = ServerFrame::Control(ControlFrame::Subscribed { channel: Channel::online() });
        assert_eq!(serde_json::to_value(&frame).unwrap(), json!({"type": "subscribed", "channel": "online"}));

        let error = ServerFrame::Control(ControlFrame::Error { channel: None, reason: "bad frame".into() });
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "channel": null, "reason": "bad frame"})
        );
    }
}
