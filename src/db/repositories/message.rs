use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::domain::{ChatroomId, MessageId, MessageRole};
use crate::entities::{chatrooms, messages};

pub struct MessageRepository {
    conn: DatabaseConnection,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Appends a message and bumps the chatroom's `updated_at` in one
    /// transaction. A failure rolls back both writes, so there is never a
    /// message row without the corresponding timestamp bump.
    pub async fn append(
        &self,
        chatroom_id: ChatroomId,
        role: MessageRole,
        content: &str,
        task_id: Option<&str>,
    ) -> Result<messages::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin message transaction")?;

        let active = messages::ActiveModel {
            chatroom_id: Set(chatroom_id.value()),
            content: Set(content.to_string()),
            role: Set(role.as_str().to_string()),
            task_id: Set(task_id.map(std::string::ToString::to_string)),
            created_at: Set(now.clone()),
            ..Default::default()
        };

        let model = active
            .insert(&txn)
            .await
            .context("Failed to insert message")?;

        chatrooms::Entity::update_many()
            .col_expr(chatrooms::Column::UpdatedAt, Expr::value(now.as_str()))
            .filter(chatrooms::Column::Id.eq(chatroom_id.value()))
            .exec(&txn)
            .await
            .context("Failed to touch chatroom for message")?;

        txn.commit()
            .await
            .context("Failed to commit message transaction")?;

        Ok(model)
    }

    /// Compensation for a user message whose task could not be dispatched.
    pub async fn remove(&self, id: MessageId) -> Result<()> {
        messages::Entity::delete_by_id(id.value())
            .exec(&self.conn)
            .await
            .context("Failed to delete message")?;

        Ok(())
    }

    /// Most recent `limit` messages, newest first, excluding the id the
    /// caller will append explicitly (so the triggering message is included
    /// exactly once regardless of read-after-write timing).
    pub async fn recent_window(
        &self,
        chatroom_id: ChatroomId,
        limit: u64,
        exclude: Option<MessageId>,
    ) -> Result<Vec<messages::Model>> {
        let mut query = messages::Entity::find()
            .filter(messages::Column::ChatroomId.eq(chatroom_id.value()))
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .limit(limit);

        if let Some(id) = exclude {
            query = query.filter(messages::Column::Id.ne(id.value()));
        }

        query
            .all(&self.conn)
            .await
            .context("Failed to query recent messages")
    }

    /// Full history in chronological order, for the detail view.
    pub async fn list_chronological(&self, chatroom_id: ChatroomId) -> Result<Vec<messages::Model>> {
        messages::Entity::find()
            .filter(messages::Column::ChatroomId.eq(chatroom_id.value()))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query chatroom messages")
    }

    pub async fn count(&self, chatroom_id: ChatroomId) -> Result<u64> {
        messages::Entity::find()
            .filter(messages::Column::ChatroomId.eq(chatroom_id.value()))
            .count(&self.conn)
            .await
            .context("Failed to count chatroom messages")
    }
}
