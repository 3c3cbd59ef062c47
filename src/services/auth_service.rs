//! Domain service for mobile-number authentication.
//!
//! Login is a two-step flow: a short-lived one-time code is issued for a
//! mobile number, then exchanged for the account's API key. First-time
//! verification creates the account.

use serde::Serialize;
use thiserror::Error;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong, expired, and already-used codes are indistinguishable.
    #[error("Invalid or expired verification code")]
    InvalidCode,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result of requesting a verification code.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRequestResult {
    pub expires_at: String,
    /// Present only when code exposure is enabled in config; otherwise the
    /// code travels out of band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Result of a successful verification: the credentials for all further
/// requests.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedLogin {
    pub user_id: i32,
    pub mobile_number: String,
    pub api_key: String,
    pub subscription_tier: String,
    pub is_new_user: bool,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Issues a fresh verification code for the mobile number.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for a malformed number.
    async fn request_code(&self, mobile_number: &str) -> Result<CodeRequestResult, AuthError>;

    /// Exchanges a code for the account's API key, creating the account on
    /// first verification.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCode`] unless an unexpired, unused code
    /// matches.
    async fn verify_code(
        &self,
        mobile_number: &str,
        code: &str,
        name: Option<&str>,
    ) -> Result<VerifiedLogin, AuthError>;
}
