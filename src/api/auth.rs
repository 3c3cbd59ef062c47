use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::api::types::{
    ApiKeyResponse, CurrentUserResponse, RequestCodeRequest, VerifyCodeRequest,
};
use crate::db::User;
use crate::services::{CodeRequestResult, VerifiedLogin};

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware that checks:
/// 1. `X-Api-Key` header
/// 2. `Authorization: Bearer <api_key>` header
///
/// On success the resolved [`User`] is inserted into request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let api_key = extract_api_key(&headers);

    if let Some(key) = api_key
        && let Ok(Some(user)) = state.store.verify_api_key(&key).await
    {
        tracing::Span::current().record("user_id", user.id.value());
        request.extensions_mut().insert(user);
        return Ok(next.run(request).await);
    }

    let response = (StatusCode::UNAUTHORIZED, "Unauthorized");
    Ok(response.into_response())
}

/// Extract API key from headers
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    // Check X-Api-Key header
    if let Some(api_key) = headers.get("X-Api-Key")
        && let Ok(key_str) = api_key.to_str()
    {
        return Some(key_str.to_string());
    }

    // Check Authorization: Bearer header
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/request-code
/// Issues a short-lived verification code for a mobile number.
pub async fn request_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RequestCodeRequest>,
) -> Result<Json<ApiResponse<CodeRequestResult>>, ApiError> {
    let result = state
        .auth_service
        .request_code(&payload.mobile_number)
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

/// POST /auth/verify-code
/// Exchanges a verification code for the account's API key, creating the
/// account on first login.
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<ApiResponse<VerifiedLogin>>, ApiError> {
    let result = state
        .auth_service
        .verify_code(
            &payload.mobile_number,
            &payload.code,
            payload.name.as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

/// GET /auth/me
/// Current user information (requires authentication).
pub async fn get_current_user(
    Extension(user): Extension<User>,
) -> Json<ApiResponse<CurrentUserResponse>> {
    Json(ApiResponse::success(CurrentUserResponse {
        user_id: user.id.value(),
        mobile_number: user.mobile_number,
        name: user.name,
        subscription_tier: user.tier.as_str().to_string(),
        daily_message_count: user.daily_message_count,
        created_at: user.created_at,
    }))
}

/// POST /auth/api-key/regenerate
/// Generate a new random API key; the old one stops working immediately.
pub async fn regenerate_api_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, ApiError> {
    let new_api_key = state
        .store
        .regenerate_api_key(user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to regenerate API key: {e}")))?;

    tracing::info!(user_id = %user.id, "API key regenerated");

    Ok(Json(ApiResponse::success(ApiKeyResponse {
        api_key: new_api_key,
    })))
}
