//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::config::AuthConfig;
use crate::db::Store;
use crate::services::auth_service::{AuthError, AuthService, CodeRequestResult, VerifiedLogin};

const CODE_PURPOSE_LOGIN: &str = "login";

pub struct SeaOrmAuthService {
    store: Store,
    code_length: usize,
    code_ttl_minutes: i64,
    expose_codes: bool,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, config: &AuthConfig) -> Self {
        Self {
            store,
            code_length: config.code_length,
            code_ttl_minutes: config.code_ttl_minutes,
            expose_codes: config.expose_codes,
        }
    }

    fn validate_mobile(mobile_number: &str) -> Result<(), AuthError> {
        let ok = mobile_number.starts_with('+')
            && mobile_number.len() >= 8
            && mobile_number.len() <= 16
            && mobile_number[1..].bytes().all(|b| b.is_ascii_digit());

        if ok {
            Ok(())
        } else {
            Err(AuthError::Validation(
                "Mobile number must be in E.164 format".to_string(),
            ))
        }
    }

    fn generate_code(&self) -> String {
        use rand::Rng;

        let mut rng = rand::rng();
        (0..self.code_length)
            .map(|_| char::from(b'0' + rng.random_range(0..10)))
            .collect()
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn request_code(&self, mobile_number: &str) -> Result<CodeRequestResult, AuthError> {
        Self::validate_mobile(mobile_number)?;

        let code = self.generate_code();
        let expires_at = (chrono::Utc::now() + chrono::Duration::minutes(self.code_ttl_minutes))
            .to_rfc3339();

        self.store
            .store_verification_code(mobile_number, &code, CODE_PURPOSE_LOGIN, &expires_at)
            .await?;

        info!(mobile_number, "Verification code issued");

        Ok(CodeRequestResult {
            expires_at,
            code: self.expose_codes.then_some(code),
        })
    }

    async fn verify_code(
        &self,
        mobile_number: &str,
        code: &str,
        name: Option<&str>,
    ) -> Result<VerifiedLogin, AuthError> {
        Self::validate_mobile(mobile_number)?;

        let now = chrono::Utc::now().to_rfc3339();
        let consumed = self
            .store
            .consume_verification_code(mobile_number, code, &now)
            .await?;

        if !consumed {
            return Err(AuthError::InvalidCode);
        }

        let (user, is_new_user) = match self.store.get_user_by_mobile(mobile_number).await? {
            Some(user) => (user, false),
            None => {
                let user = self.store.create_user(mobile_number, name).await?;
                info!(mobile_number, user_id = %user.id, "Account created on first login");
                (user, true)
            }
        };

        Ok(VerifiedLogin {
            user_id: user.id.value(),
            mobile_number: user.mobile_number,
            api_key: user.api_key,
            subscription_tier: user.tier.as_str().to_string(),
            is_new_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> SeaOrmAuthService {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        SeaOrmAuthService::new(store, &AuthConfig::default())
    }

    #[tokio::test]
    async fn code_round_trip_creates_the_account() {
        let svc = service().await;

        let issued = svc.request_code("+15550006666").await.unwrap();
        let code = issued.code.expect("codes exposed by default config");
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));

        let login = svc
            .verify_code("+15550006666", &code, Some("Sam"))
            .await
            .unwrap();
        assert!(login.is_new_user);
        assert_eq!(login.mobile_number, "+15550006666");
        assert!(!login.api_key.is_empty());

        // Second login with a fresh code reuses the account.
        let issued = svc.request_code("+15550006666").await.unwrap();
        let login2 = svc
            .verify_code("+15550006666", &issued.code.unwrap(), None)
            .await
            .unwrap();
        assert!(!login2.is_new_user);
        assert_eq!(login2.user_id, login.user_id);
    }

    #[tokio::test]
    async fn a_code_is_single_use() {
        let svc = service().await;

        let code = svc.request_code("+15550007777").await.unwrap().code.unwrap();
        svc.verify_code("+15550007777", &code, None).await.unwrap();

        let err = svc.verify_code("+15550007777", &code, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn a_wrong_code_is_rejected() {
        let svc = service().await;

        svc.request_code("+15550008888").await.unwrap();
        let err = svc
            .verify_code("+15550008888", "000000", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn malformed_numbers_are_rejected() {
        let svc = service().await;

        for bad in ["", "12345678", "+12ab5678", "+1", "+123456789012345678"] {
            let err = svc.request_code(bad).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "accepted {bad:?}");
        }
    }
}
