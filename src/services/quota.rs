//! Daily message quota enforcement.
//!
//! Quota is a per-user daily counter with a tier-dependent limit. The
//! decision lives in the database as a single conditional UPDATE, so two
//! concurrent sends at limit-1 can never both pass. A day rollover is
//! applied (and committed) before the limit check; after the reset the
//! counter always reads against today's date.

use thiserror::Error;

use crate::config::QuotaConfig;
use crate::db::{Store, User};
use crate::domain::{SubscriptionTier, UserId};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Daily message limit of {limit} reached")]
    DailyLimitExceeded { limit: i32 },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for QuotaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Reserves and releases units of daily quota.
#[derive(Clone)]
pub struct QuotaTracker {
    store: Store,
    basic_limit: i32,
    pro_limit: i32,
}

impl QuotaTracker {
    #[must_use]
    pub fn new(store: Store, config: &QuotaConfig) -> Self {
        Self {
            store,
            basic_limit: config.basic_daily_limit,
            pro_limit: config.pro_daily_limit,
        }
    }

    #[must_use]
    pub const fn limit_for(&self, tier: SubscriptionTier) -> i32 {
        match tier {
            SubscriptionTier::Basic => self.basic_limit,
            SubscriptionTier::Pro => self.pro_limit,
        }
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Consumes one unit of the user's daily quota, resetting the counter
    /// first if the stored date is stale.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::DailyLimitExceeded`] when the user is at their
    /// tier's limit for today.
    pub async fn check_and_reserve(&self, user: &User) -> Result<(), QuotaError> {
        let today = Self::today();
        let limit = self.limit_for(user.tier);

        self.store.reset_quota_if_new_day(user.id, &today).await?;

        if self.store.try_reserve_quota(user.id, &today, limit).await? {
            Ok(())
        } else {
            Err(QuotaError::DailyLimitExceeded { limit })
        }
    }

    /// Returns one unit of quota after a reservation whose message was never
    /// durably accepted. Failure here is logged by the caller and otherwise
    /// ignored; the counter self-corrects at the next day rollover.
    pub async fn release(&self, user_id: UserId) -> Result<(), QuotaError> {
        self.store.release_quota(user_id).await?;
        Ok(())
    }
}
