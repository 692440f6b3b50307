use crate::api::AppState;
use crate::api::dto::messages::{DeleteMessageResponse, SendMessageRequest};
use crate::api::middleware::{AuthUser, JsonBody};
use crate::domain::message::NewMessage;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Sends a direct or group message.
///
/// # Errors
/// Returns `AppError::BadRequest` if the payload is invalid.
/// Returns `AppError::Forbidden` if the caller is not a member of the group.
/// Returns `AppError::NotFound` if the receiver or group does not exist.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let new_message = NewMessage::try_from(payload)?;
    let message = state.message_service.send(auth_user.user_id, new_message).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Deletes one of the caller's messages.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller did not send the message.
/// Returns `AppError::NotFound` if the message does not exist.
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<DeleteMessageResponse>> {
    let message = state.message_service.delete(auth_user.user_id, message_id).await?;
    Ok(Json(DeleteMessageResponse { message }))
}

/// Returns the page of messages before the given one.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller cannot see the conversation.
/// Returns `AppError::NotFound` if the reference message does not exist.
pub async fn older_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.message_service.load_older(auth_user.user_id, message_id).await?;
    Ok(Json(messages))
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller may not open this conversation.
/// Returns `AppError::NotFound` if the other user does not exist.
pub async fn direct_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.message_service.latest_direct(auth_user.user_id, user_id).await?;
    Ok(Json(messages))
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member.
/// Returns `AppError::NotFound` if the group does not exist.
pub async fn group_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.message_service.latest_group(auth_user.user_id, group_id).await?;
    Ok(Json(messages))
}
