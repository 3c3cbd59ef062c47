use sea_orm::entity::prelude::*;

/// Immutable once created; ordered by (`created_at`, `id`) within a chatroom.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub chatroom_id: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// "user" or "assistant"
    pub role: String,

    /// Opaque id of the generation task that produced an assistant row.
    pub task_id: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chatrooms::Entity",
        from = "Column::ChatroomId",
        to = "super::chatrooms::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Chatrooms,
}

impl Related<super::chatrooms::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chatrooms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
