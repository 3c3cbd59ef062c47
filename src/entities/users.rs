use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub mobile_number: String,

    pub name: Option<String>,

    pub email: Option<String>,

    /// Random API key (64-char hex string)
    #[sea_orm(unique)]
    pub api_key: String,

    /// "basic" or "pro"; drives the daily message quota.
    pub subscription_tier: String,

    /// Messages counted against `last_message_date`; meaningless once that
    /// date is stale.
    pub daily_message_count: i32,

    /// Calendar date "YYYY-MM-DD" of the last counted message.
    pub last_message_date: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chatrooms::Entity")]
    Chatrooms,
}

impl Related<super::chatrooms::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chatrooms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
