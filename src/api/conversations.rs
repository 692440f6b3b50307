use crate::api::AppState;
use crate::api::dto::groups::CreateGroupRequest;
use crate::api::middleware::{AuthUser, JsonBody};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Lists the caller's conversations and groups, most recent first.
///
/// # Errors
/// Returns `AppError::Database` if the lookup fails.
pub async fn list_conversations(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summaries = state.conversation_service.list(auth_user.user_id).await?;
    Ok(Json(summaries))
}

/// Creates a group owned by the caller.
///
/// # Errors
/// Returns `AppError::BadRequest` if the name is invalid.
/// Returns `AppError::NotFound` if a member does not exist.
pub async fn create_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    let group = state.conversation_service.create_group(auth_user.user_id, &payload.name, &payload.member_ids).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// Deletes a group the caller owns.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller is not the owner.
/// Returns `AppError::NotFound` if the group does not exist.
pub async fn delete_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.conversation_service.delete_group(auth_user.user_id, group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
