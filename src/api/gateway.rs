use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::domain::auth::Claims;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{Extensions, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_http::request_id::RequestId;

/// Browsers cannot set headers on a WebSocket handshake, so the token travels in the query.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    match Claims::decode(&params.token, &state.config.auth.jwt_secret) {
        Ok(claims) => {
            let user = AuthUser::from(claims).summary();
            ws.on_upgrade(move |socket| async move {
                state.gateway_service.handle_socket(socket, user, request_id, state.shutdown_rx.clone()).await;
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}
