use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{ChatroomId, MessageId, MessageRole, UserId};
use crate::entities::{chatrooms, messages, system_logs};

pub mod migrator;
pub mod repositories;

pub use repositories::chatroom::ChatroomSummary;
pub use repositories::user::User;

/// Facade over the relational store: owns the connection pool and delegates
/// to per-table repositories. All CRUD the services need goes through here.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn chatroom_repo(&self) -> repositories::chatroom::ChatroomRepository {
        repositories::chatroom::ChatroomRepository::new(self.conn.clone())
    }

    fn message_repo(&self) -> repositories::message::MessageRepository {
        repositories::message::MessageRepository::new(self.conn.clone())
    }

    fn code_repo(&self) -> repositories::verification_code::VerificationCodeRepository {
        repositories::verification_code::VerificationCodeRepository::new(self.conn.clone())
    }

    fn logs_repo(&self) -> repositories::logs::LogRepository {
        repositories::logs::LogRepository::new(self.conn.clone())
    }

    // --- users & quota ---

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_mobile(&self, mobile_number: &str) -> Result<Option<User>> {
        self.user_repo().get_by_mobile(mobile_number).await
    }

    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<User>> {
        self.user_repo().verify_api_key(api_key).await
    }

    pub async fn create_user(&self, mobile_number: &str, name: Option<&str>) -> Result<User> {
        self.user_repo().create(mobile_number, name).await
    }

    pub async fn regenerate_api_key(&self, id: UserId) -> Result<String> {
        self.user_repo().regenerate_api_key(id).await
    }

    pub async fn reset_quota_if_new_day(&self, id: UserId, today: &str) -> Result<()> {
        self.user_repo().reset_quota_if_new_day(id, today).await
    }

    pub async fn try_reserve_quota(&self, id: UserId, today: &str, limit: i32) -> Result<bool> {
        self.user_repo().try_reserve_quota(id, today, limit).await
    }

    pub async fn release_quota(&self, id: UserId) -> Result<()> {
        self.user_repo().release_quota(id).await
    }

    // --- chatrooms ---

    pub async fn create_chatroom(
        &self,
        user_id: UserId,
        title: &str,
        description: Option<&str>,
    ) -> Result<chatrooms::Model> {
        self.chatroom_repo()
            .create(user_id, title, description)
            .await
    }

    pub async fn get_chatroom(&self, id: ChatroomId) -> Result<Option<chatrooms::Model>> {
        self.chatroom_repo().get(id).await
    }

    pub async fn get_owned_chatroom(
        &self,
        id: ChatroomId,
        user_id: UserId,
    ) -> Result<Option<chatrooms::Model>> {
        self.chatroom_repo().get_owned(id, user_id).await
    }

    pub async fn list_chatroom_summaries(&self, user_id: UserId) -> Result<Vec<ChatroomSummary>> {
        self.chatroom_repo().list_summaries(user_id).await
    }

    pub async fn remove_chatroom(&self, id: ChatroomId, user_id: UserId) -> Result<bool> {
        self.chatroom_repo().remove(id, user_id).await
    }

    // --- messages ---

    pub async fn append_message(
        &self,
        chatroom_id: ChatroomId,
        role: MessageRole,
        content: &str,
        task_id: Option<&str>,
    ) -> Result<messages::Model> {
        self.message_repo()
            .append(chatroom_id, role, content, task_id)
            .await
    }

    pub async fn remove_message(&self, id: MessageId) -> Result<()> {
        self.message_repo().remove(id).await
    }

    pub async fn recent_messages(
        &self,
        chatroom_id: ChatroomId,
        limit: u64,
        exclude: Option<MessageId>,
    ) -> Result<Vec<messages::Model>> {
        self.message_repo()
            .recent_window(chatroom_id, limit, exclude)
            .await
    }

    pub async fn list_messages(&self, chatroom_id: ChatroomId) -> Result<Vec<messages::Model>> {
        self.message_repo().list_chronological(chatroom_id).await
    }

    pub async fn count_messages(&self, chatroom_id: ChatroomId) -> Result<u64> {
        self.message_repo().count(chatroom_id).await
    }

    // --- verification codes ---

    pub async fn store_verification_code(
        &self,
        mobile_number: &str,
        code: &str,
        purpose: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.code_repo()
            .create(mobile_number, code, purpose, expires_at)
            .await
    }

    pub async fn consume_verification_code(
        &self,
        mobile_number: &str,
        code: &str,
        now: &str,
    ) -> Result<bool> {
        self.code_repo().consume(mobile_number, code, now).await
    }

    pub async fn delete_expired_codes(&self, now: &str) -> Result<u64> {
        self.code_repo().delete_expired(now).await
    }

    // --- system logs ---

    pub async fn add_system_log(
        &self,
        event_type: &str,
        level: &str,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        self.logs_repo()
            .add(event_type, level, message, details)
            .await
    }

    pub async fn recent_system_logs(&self, limit: u64) -> Result<Vec<system_logs::Model>> {
        self.logs_repo().recent(limit).await
    }
}
