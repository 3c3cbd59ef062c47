use sea_orm::entity::prelude::*;

/// Ephemeral login codes; expired rows are reaped by the housekeeping sweep.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "verification_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub mobile_number: String,

    pub code: String,

    /// "login", "signup", ...
    pub purpose: String,

    pub expires_at: String,

    pub is_used: bool,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
