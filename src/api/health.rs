use crate::api::MgmtState;
use crate::api::dto::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks the database and the broadcaster transport.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_res, broadcaster_res) =
        tokio::join!(state.health_service.check_db(), state.health_service.check_broadcaster());

    let mut status_code = StatusCode::OK;
    let mut component_status = |component: &str, result: Result<(), String>| match result {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, component, "Readiness probe failed");
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            "error".to_string()
        }
    };
    let database = component_status("database", db_res);
    let broadcaster = component_status("broadcaster", broadcaster_res);

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database,
        broadcaster,
    };

    (status_code, Json(response))
}
