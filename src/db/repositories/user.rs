use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::domain::{SubscriptionTier, UserId};
use crate::entities::users;

/// User data returned from the repository.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub mobile_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub api_key: String,
    pub tier: SubscriptionTier,
    pub daily_message_count: i32,
    pub last_message_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: UserId::new(model.id),
            mobile_number: model.mobile_number,
            name: model.name,
            email: model.email,
            api_key: model.api_key,
            tier: SubscriptionTier::from_str_lossy(&model.subscription_tier),
            daily_message_count: model.daily_message_count,
            last_message_date: model.last_message_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_mobile(&self, mobile_number: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::MobileNumber.eq(mobile_number))
            .one(&self.conn)
            .await
            .context("Failed to query user by mobile number")?;

        Ok(user.map(User::from))
    }

    /// Verify API key and return the associated user
    pub async fn verify_api_key(&self, api_key: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::ApiKey.eq(api_key))
            .one(&self.conn)
            .await
            .context("Failed to query user by API key")?;

        Ok(user.map(User::from))
    }

    /// Creates a user with a fresh API key and the basic tier.
    pub async fn create(&self, mobile_number: &str, name: Option<&str>) -> Result<User> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            mobile_number: Set(mobile_number.to_string()),
            name: Set(name.map(std::string::ToString::to_string)),
            api_key: Set(generate_api_key()),
            subscription_tier: Set(SubscriptionTier::Basic.as_str().to_string()),
            daily_message_count: Set(0),
            last_message_date: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to create user")?;

        Ok(User::from(model))
    }

    /// Regenerate API key for a user
    pub async fn regenerate_api_key(&self, id: UserId) -> Result<String> {
        let user = users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for API key regeneration")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let new_api_key = generate_api_key();
        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.api_key = Set(new_api_key.clone());
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(new_api_key)
    }

    /// Resets the daily counter when the stored date is not `today`.
    ///
    /// The reset is committed before any limit decision is made, so a user
    /// whose last message was yesterday always starts the new day at zero.
    /// Running this concurrently is harmless: the filter makes the reset a
    /// no-op once any one request has applied it.
    pub async fn reset_quota_if_new_day(&self, id: UserId, today: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::DailyMessageCount, Expr::value(0))
            .col_expr(users::Column::LastMessageDate, Expr::value(today))
            .filter(users::Column::Id.eq(id.value()))
            .filter(
                Condition::any()
                    .add(users::Column::LastMessageDate.is_null())
                    .add(users::Column::LastMessageDate.ne(today)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to reset daily quota")?;

        Ok(())
    }

    /// Atomically consumes one unit of daily quota.
    ///
    /// Single conditional UPDATE guarded by `daily_message_count < limit AND
    /// last_message_date = today`; the row-level compare-and-set that keeps
    /// two concurrent requests from both passing the limit check. Returns
    /// false when the user is already at (or past) the limit.
    pub async fn try_reserve_quota(&self, id: UserId, today: &str, limit: i32) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::DailyMessageCount,
                Expr::col(users::Column::DailyMessageCount).add(1),
            )
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::LastMessageDate.eq(today))
            .filter(users::Column::DailyMessageCount.lt(limit))
            .exec(&self.conn)
            .await
            .context("Failed to reserve daily quota")?;

        Ok(result.rows_affected == 1)
    }

    /// Returns one unit of quota after a reservation whose message was never
    /// durably accepted.
    pub async fn release_quota(&self, id: UserId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(
                users::Column::DailyMessageCount,
                Expr::col(users::Column::DailyMessageCount).sub(1),
            )
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::DailyMessageCount.gt(0))
            .exec(&self.conn)
            .await
            .context("Failed to release daily quota")?;

        Ok(())
    }
}

/// Generate a random API key (64 character hex string)
#[must_use]
pub fn generate_api_key() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
