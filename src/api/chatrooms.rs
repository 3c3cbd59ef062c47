use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::api::types::{CreateChatroomRequest, SendMessageRequest, SendMessageResponse};
use crate::db::{ChatroomSummary, User};
use crate::domain::ChatroomId;
use crate::services::ChatroomDetail;

/// GET /chatrooms
/// The caller's chatrooms, most recently active first.
pub async fn list_chatrooms(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<ApiResponse<Vec<ChatroomSummary>>>, ApiError> {
    let list = state.chat_service.list_chatrooms(&user).await?;
    Ok(Json(ApiResponse::success(list)))
}

/// POST /chatrooms
pub async fn create_chatroom(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateChatroomRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatroomSummary>>), ApiError> {
    let summary = state
        .chat_service
        .create_chatroom(&user, &payload.title, payload.description.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(summary))))
}

/// GET /chatrooms/{id}
/// Full chatroom view with messages in chronological order.
pub async fn get_chatroom(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ChatroomDetail>>, ApiError> {
    let detail = state
        .chat_service
        .get_chatroom(&user, ChatroomId::new(id))
        .await?;

    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /chatrooms/{id}
pub async fn remove_chatroom(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .chat_service
        .remove_chatroom(&user, ChatroomId::new(id))
        .await?;

    Ok(Json(ApiResponse {
        success: true,
        data: None,
        error: None,
    }))
}

/// POST /chatrooms/{id}/messages
/// Accepts a message and queues the reply; returns 202 with the task id.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i32>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SendMessageResponse>>), ApiError> {
    let outcome = state
        .chat_service
        .send_message(&user, ChatroomId::new(id), &payload.content)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(SendMessageResponse {
            message_id: outcome.message_id,
            task_id: outcome.task_id,
            status: "queued".to_string(),
            created_at: outcome.created_at,
        })),
    ))
}
