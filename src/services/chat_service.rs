//! Domain service for chatrooms and message submission.

use serde::Serialize;
use thiserror::Error;

use crate::db::ChatroomSummary;
use crate::db::User;
use crate::domain::ChatroomId;

/// Errors specific to chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Absent and not-owned are deliberately indistinguishable.
    #[error("Chatroom not found")]
    ChatroomNotFound,

    #[error("Daily message limit of {limit} reached")]
    QuotaExceeded { limit: i32 },

    #[error("Message accepted nowhere: task queue is unavailable")]
    QueueUnavailable,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for ChatError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// One message as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i32,
    pub content: String,
    pub role: String,
    pub task_id: Option<String>,
    pub created_at: String,
}

/// Full chatroom view with its messages in chronological order.
#[derive(Debug, Clone, Serialize)]
pub struct ChatroomDetail {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<MessageView>,
}

/// Returned synchronously from a send: the persisted user message plus the
/// opaque id of the queued generation task.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message_id: i32,
    pub task_id: String,
    pub created_at: String,
}

/// Domain service trait for chat operations.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    /// Creates a chatroom owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for an empty title.
    async fn create_chatroom(
        &self,
        user: &User,
        title: &str,
        description: Option<&str>,
    ) -> Result<ChatroomSummary, ChatError>;

    /// Lists the user's chatrooms, most recently active first. Served from
    /// the TTL cache when possible.
    async fn list_chatrooms(&self, user: &User) -> Result<Vec<ChatroomSummary>, ChatError>;

    /// Fetches one owned chatroom with its full message history.
    async fn get_chatroom(&self, user: &User, id: ChatroomId) -> Result<ChatroomDetail, ChatError>;

    /// Deletes an owned chatroom and everything in it.
    async fn remove_chatroom(&self, user: &User, id: ChatroomId) -> Result<(), ChatError>;

    /// Accepts a user message and queues the asynchronous reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::QuotaExceeded`] at the daily limit and
    /// [`ChatError::QueueUnavailable`] when the task cannot be queued; in
    /// the latter case the message is not persisted and no quota is spent.
    async fn send_message(
        &self,
        user: &User,
        id: ChatroomId,
        content: &str,
    ) -> Result<SendOutcome, ChatError>;
}
