use crate::api::rate_limit::log_rate_limit_events;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::reaction_service::ReactionService;
use axum::body::Body;
use axum::http::Request;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod dto;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod rate_limit;
pub mod reactions;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub message_service: MessageService,
    pub reaction_service: ReactionService,
    pub conversation_service: ConversationService,
    pub gateway_service: GatewayService,
    pub rate_limit_service: RateLimitService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub message_service: MessageService,
    pub reaction_service: ReactionService,
    pub conversation_service: ConversationService,
    pub gateway_service: GatewayService,
    pub rate_limit_service: RateLimitService,
}

/// Configures and returns the primary application router.
///
/// # Panics
/// Panics if the rate limiter configuration cannot be constructed.
pub fn app_router(
    config: Config,
    services: ServiceContainer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Router {
    let interval_ns = 1_000_000_000 / config.rate_limit.per_second.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(interval_ns))
            .burst_size(config.rate_limit.burst.max(1))
            .key_extractor(services.rate_limit_service.extractor.clone())
            .finish()
            .expect("Failed to build rate limiter config"),
    );

    let state = AppState {
        config,
        message_service: services.message_service,
        reaction_service: services.reaction_service,
        conversation_service: services.conversation_service,
        gateway_service: services.gateway_service,
        rate_limit_service: services.rate_limit_service,
        shutdown_rx,
    };

    let api_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/older", get(messages::older_messages))
        .route("/messages/{id}/reactions", post(reactions::add_reaction).delete(reactions::remove_reaction))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/users/{userId}/messages", get(messages::direct_messages))
        .route("/conversations/groups/{groupId}/messages", get(messages::group_messages))
        .route("/groups", post(conversations::create_group))
        .route("/groups/{id}", delete(conversations::delete_group))
        .route("/gateway", get(gateway::websocket_handler))
        .layer(GovernorLayer::new(governor_conf));

    Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn_with_state(state.clone(), log_rate_limit_events))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
