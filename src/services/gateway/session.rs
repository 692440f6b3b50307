use crate::adapters::database::DbPool;
use crate::config::WsConfig;
use crate::domain::event::{Channel, ChannelKind, ChatEvent, Envelope};
use crate::domain::user::UserSummary;
use crate::services::access::AccessPolicy;
use crate::services::broadcast::Broadcaster;
use crate::services::gateway::subscriptions::{SubscriptionGuard, Subscriptions};
use crate::services::gateway::{ClientFrame, ControlFrame, Metrics, ServerFrame};
use crate::services::presence_service::PresenceService;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) struct Session {
    pub(crate) user: UserSummary,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) pool: DbPool,
    pub(crate) access: AccessPolicy,
    pub(crate) broadcaster: Arc<dyn Broadcaster>,
    pub(crate) presence: PresenceService,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

/// The part of a session that handles client frames.
struct FrameHandler {
    user: UserSummary,
    pool: DbPool,
    access: AccessPolicy,
    broadcaster: Arc<dyn Broadcaster>,
    presence: PresenceService,
    metrics: Metrics,
    max_subscriptions: usize,
    outbound_tx: mpsc::Sender<WsMessage>,
    subscriptions: Subscriptions,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            user_id = %self.user.id,
            request_id = %self.request_id,
            otel.kind = "server",
            ws.session_id = %Uuid::new_v4()
        )
    )]
    pub(crate) async fn run(self) {
        let Self { user, socket, pool, access, broadcaster, presence, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");
        presence.join(user.clone()).await;

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(config.outbound_buffer_size.max(1));

        let mut handler = FrameHandler {
            user: user.clone(),
            pool,
            access,
            broadcaster,
            presence: presence.clone(),
            metrics: metrics.clone(),
            max_subscriptions: config.max_subscriptions,
            outbound_tx,
            subscriptions: Subscriptions::default(),
        };

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                msg = ws_stream.next() => {
                    let continue_loop = match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            handler.handle_text(text.as_str()).await;
                            true
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => false,
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary message");
                            true
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat from client");
                            true
                        }
                    };

                    if !continue_loop { break; }
                }

                msg = outbound_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if ws_sink.send(msg).await.is_err() { break; }
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = ws_sink.close().await;

        // Dropping the handler drops every subscription guard.
        drop(handler);
        presence.leave(user.id).await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}

impl FrameHandler {
    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(ClientFrame::Subscribe { channel }) => self.subscribe(&channel).await,
            Ok(ClientFrame::Unsubscribe { channel }) => self.unsubscribe(&channel),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode client frame");
                self.reply(ControlFrame::Error { channel: None, reason: "invalid frame".into() });
            }
        }
    }

    async fn subscribe(&mut self, name: &str) {
        let Some(channel) = Channel::parse(name) else {
            self.refuse(name, "unknown channel", "invalid");
            return;
        };
        if self.subscriptions.contains(&channel) {
            self.reply(ControlFrame::Subscribed { channel });
            return;
        }
        if self.subscriptions.len() >= self.max_subscriptions {
            self.refuse(name, "too many subscriptions", "limit");
            return;
        }

        let allowed = match self.pool.acquire().await {
            Ok(mut conn) => self.access.can_subscribe(&mut conn, self.user.id, &channel).await,
            Err(e) => Err(e.into()),
        };
        match allowed {
            Ok(true) => {}
            Ok(false) => {
                self.refuse(name, "forbidden", "forbidden");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, channel = %channel, "Subscription check failed");
                self.refuse(name, "internal error", "error");
                return;
            }
        }

        let rx = self.broadcaster.subscribe(&channel).await;
        let guard = SubscriptionGuard::spawn(&channel, self.user.id, rx, self.outbound_tx.clone(), self.metrics.clone());
        self.subscriptions.insert(channel.clone(), guard);
        self.metrics.subscriptions_total.add(1, &[KeyValue::new("status", "accepted")]);
        tracing::debug!(channel = %channel, "Subscribed");

        self.reply(ControlFrame::Subscribed { channel: channel.clone() });
        if channel.kind() == Some(ChannelKind::Online) {
            let here = Envelope::new(channel, ChatEvent::PresenceHere { users: self.presence.snapshot() });
            if let Some(frame) = ServerFrame::Event(&here).encode() {
                self.push(frame);
            }
        }
    }

    fn unsubscribe(&mut self, name: &str) {
        let Some(channel) = Channel::parse(name) else {
            self.refuse(name, "unknown channel", "invalid");
            return;
        };
        if self.subscriptions.remove(&channel) {
            tracing::debug!(channel = %channel, "Unsubscribed");
        }
        self.reply(ControlFrame::Unsubscribed { channel });
    }

    fn refuse(&self, name: &str, reason: &str, status: &'static str) {
        self.metrics.subscriptions_total.add(1, &[KeyValue::new("status", status)]);
        self.reply(ControlFrame::Error { channel: Some(name.to_string()), reason: reason.to_string() });
    }

    fn reply(&self, control: ControlFrame) {
        if let Some(frame) = ServerFrame::Control(control).encode() {
            self.push(frame);
        }
    }

    fn push(&self, frame: WsMessage) {
        if self.outbound_tx.try_send(frame).is_err() {
            self.metrics.outbound_dropped_total.add(1, &[KeyValue::new("reason", "buffer_full")]);
        }
    }
}
