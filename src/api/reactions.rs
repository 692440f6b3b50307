use crate::api::AppState;
use crate::api::dto::reactions::{ReactionRequest, ReactionResponse};
use crate::api::middleware::{AuthUser, JsonBody};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Adds the caller's reaction to a message. Repeating it is a no-op.
///
/// # Errors
/// Returns `AppError::BadRequest` if the emoji is missing or too long.
/// Returns `AppError::NotFound` if the message does not exist.
pub async fn add_reaction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    JsonBody(payload): JsonBody<ReactionRequest>,
) -> Result<Json<ReactionResponse>> {
    let reaction = state.reaction_service.add(auth_user.user_id, message_id, &payload.emoji).await?;
    Ok(Json(ReactionResponse { success: true, reaction: Some(reaction) }))
}

/// Removes the caller's reaction. Removing a missing reaction still succeeds.
///
/// # Errors
/// Returns `AppError::BadRequest` if the emoji is missing or too long.
/// Returns `AppError::NotFound` if the message does not exist.
pub async fn remove_reaction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    JsonBody(payload): JsonBody<ReactionRequest>,
) -> Result<Json<ReactionResponse>> {
    state.reaction_service.remove(auth_user.user_id, message_id, &payload.emoji).await?;
    Ok(Json(ReactionResponse { success: true, reaction: None }))
}
