use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set,
};

use crate::domain::{ChatroomId, UserId};
use crate::entities::{chatrooms, messages};

/// Chatroom row with its aggregate message count, ordered most recently
/// updated first by the summary query. This is the shape the chatroom cache
/// stores verbatim.
#[derive(Debug, Clone, FromQueryResult, serde::Serialize, serde::Deserialize)]
pub struct ChatroomSummary {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

pub struct ChatroomRepository {
    conn: DatabaseConnection,
}

impl ChatroomRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: UserId,
        title: &str,
        description: Option<&str>,
    ) -> Result<chatrooms::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = chatrooms::ActiveModel {
            user_id: Set(user_id.value()),
            title: Set(title.to_string()),
            description: Set(description.map(std::string::ToString::to_string)),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to create chatroom")
    }

    pub async fn get(&self, id: ChatroomId) -> Result<Option<chatrooms::Model>> {
        chatrooms::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query chatroom")
    }

    /// Resolves a chatroom only if it belongs to `user_id` (ownership check).
    pub async fn get_owned(
        &self,
        id: ChatroomId,
        user_id: UserId,
    ) -> Result<Option<chatrooms::Model>> {
        chatrooms::Entity::find_by_id(id.value())
            .filter(chatrooms::Column::UserId.eq(user_id.value()))
            .one(&self.conn)
            .await
            .context("Failed to query chatroom by owner")
    }

    /// Computes the chatroom list with per-room message counts, most
    /// recently updated first.
    pub async fn list_summaries(&self, user_id: UserId) -> Result<Vec<ChatroomSummary>> {
        chatrooms::Entity::find()
            .filter(chatrooms::Column::UserId.eq(user_id.value()))
            .join(
                sea_orm::JoinType::LeftJoin,
                chatrooms::Relation::Messages.def(),
            )
            .select_only()
            .column(chatrooms::Column::Id)
            .column(chatrooms::Column::Title)
            .column(chatrooms::Column::Description)
            .column(chatrooms::Column::CreatedAt)
            .column(chatrooms::Column::UpdatedAt)
            .column_as(messages::Column::Id.count(), "message_count")
            .group_by(chatrooms::Column::Id)
            .order_by_desc(chatrooms::Column::UpdatedAt)
            .into_model::<ChatroomSummary>()
            .all(&self.conn)
            .await
            .context("Failed to query chatroom summaries")
    }

    /// Bumps `updated_at` so the room floats to the top of the list.
    pub async fn touch(&self, id: ChatroomId, now: &str) -> Result<()> {
        chatrooms::Entity::update_many()
            .col_expr(chatrooms::Column::UpdatedAt, Expr::value(now))
            .filter(chatrooms::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to touch chatroom")?;

        Ok(())
    }

    /// Deletes a chatroom the user owns; messages cascade.
    pub async fn remove(&self, id: ChatroomId, user_id: UserId) -> Result<bool> {
        let result = chatrooms::Entity::delete_many()
            .filter(chatrooms::Column::Id.eq(id.value()))
            .filter(chatrooms::Column::UserId.eq(user_id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to delete chatroom")?;

        Ok(result.rows_affected > 0)
    }
}
