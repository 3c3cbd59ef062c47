use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::verification_codes;

pub struct VerificationCodeRepository {
    conn: DatabaseConnection,
}

impl VerificationCodeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        mobile_number: &str,
        code: &str,
        purpose: &str,
        expires_at: &str,
    ) -> Result<()> {
        let active = verification_codes::ActiveModel {
            mobile_number: Set(mobile_number.to_string()),
            code: Set(code.to_string()),
            purpose: Set(purpose.to_string()),
            expires_at: Set(expires_at.to_string()),
            is_used: Set(false),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to store verification code")?;

        Ok(())
    }

    /// Marks a matching unused, unexpired code as used.
    ///
    /// The is_used guard sits inside the UPDATE filter, so two concurrent
    /// verifications of the same code can only ever consume it once.
    pub async fn consume(&self, mobile_number: &str, code: &str, now: &str) -> Result<bool> {
        let result = verification_codes::Entity::update_many()
            .col_expr(verification_codes::Column::IsUsed, Expr::value(true))
            .filter(verification_codes::Column::MobileNumber.eq(mobile_number))
            .filter(verification_codes::Column::Code.eq(code))
            .filter(verification_codes::Column::IsUsed.eq(false))
            .filter(verification_codes::Column::ExpiresAt.gt(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume verification code")?;

        Ok(result.rows_affected > 0)
    }

    /// Bulk delete of codes whose expiry is before `now`; no per-record side
    /// effects. Returns the number of rows removed.
    pub async fn delete_expired(&self, now: &str) -> Result<u64> {
        let result = verification_codes::Entity::delete_many()
            .filter(verification_codes::Column::ExpiresAt.lt(now))
            .exec(&self.conn)
            .await
            .context("Failed to delete expired verification codes")?;

        Ok(result.rows_affected)
    }
}
