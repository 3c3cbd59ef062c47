use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// API key of the seeded demo user (regenerate via the verify-code flow).
const DEMO_API_KEY: &str = "parlor_demo_api_key_please_regenerate";

/// Mobile number of the seeded demo user.
const DEMO_MOBILE: &str = "+10000000000";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Chatrooms)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Messages)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(VerificationCodes)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(SystemLogs)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Window query for context assembly and the chatroom summary join
        // both filter on chatroom_id.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_messages_chatroom_created")
                    .table(Messages)
                    .col(crate::entities::messages::Column::ChatroomId)
                    .col(crate::entities::messages::Column::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_verification_codes_expires")
                    .table(VerificationCodes)
                    .col(crate::entities::verification_codes::Column::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Seed a demo user so a fresh install can talk to the API immediately.
        let now = chrono::Utc::now().to_rfc3339();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                crate::entities::users::Column::MobileNumber,
                crate::entities::users::Column::ApiKey,
                crate::entities::users::Column::SubscriptionTier,
                crate::entities::users::Column::DailyMessageCount,
                crate::entities::users::Column::CreatedAt,
                crate::entities::users::Column::UpdatedAt,
            ])
            .values_panic([
                DEMO_MOBILE.into(),
                DEMO_API_KEY.into(),
                "basic".into(),
                0.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemLogs).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VerificationCodes).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Messages).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Chatrooms).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
