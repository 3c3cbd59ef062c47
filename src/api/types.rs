use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChatroomRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Synchronous reply to a send: the accepted user message plus the task id
/// clients can correlate with SSE events.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: i32,
    pub task_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestCodeRequest {
    pub mobile_number: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub mobile_number: String,
    pub code: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user_id: i32,
    pub mobile_number: String,
    pub name: Option<String>,
    pub subscription_tier: String,
    pub daily_message_count: i32,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub database_ok: bool,
    pub scheduler_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct LogDto {
    pub id: i64,
    pub event_type: String,
    pub level: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: String,
}
