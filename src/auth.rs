use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::debug;

/// Short-lived bearer credential for store calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        AccessToken {
            token: token.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Who is asking for a credential.
#[derive(Debug, Clone)]
pub struct Identity {
    pub issuer: String,
    pub installation_id: Option<String>,
}

/// Key material used to sign identity assertions.
#[derive(Clone, Default)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        SigningKey(bytes.into())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes>)", self.0.len())
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn obtain_access_token(
        &self,
        identity: &Identity,
        key: &SigningKey,
    ) -> Result<AccessToken, AppError>;
}

/// Hands out a pre-provisioned token, stamped with a fresh expiry per call.
pub struct StaticTokenProvider {
    token: String,
    lifetime: Duration,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        StaticTokenProvider {
            token: token.into(),
            lifetime,
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn obtain_access_token(
        &self,
        identity: &Identity,
        _key: &SigningKey,
    ) -> Result<AccessToken, AppError> {
        if self.token.trim().is_empty() {
            return Err(AppError::Auth("no access token configured".into()));
        }
        if self.lifetime <= Duration::zero() {
            return Err(AppError::Auth("token lifetime must be positive".into()));
        }
        debug!(
            issuer = %identity.issuer,
            installation = ?identity.installation_id,
            "issuing static access token"
        );
        Ok(AccessToken::new(self.token.clone(), Utc::now() + self.lifetime))
    }
}

/// Obtain a token for one logical operation, refusing one that is already stale.
pub async fn fresh_token(
    provider: &dyn CredentialProvider,
    identity: &Identity,
    key: &SigningKey,
) -> Result<AccessToken, AppError> {
    let token = provider.obtain_access_token(identity, key).await?;
    if token.is_expired(Utc::now()) {
        return Err(AppError::Auth(format!(
            "credential for {} expired at {}",
            identity.issuer, token.expires_at
        )));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExpiredProvider;

    #[async_trait]
    impl CredentialProvider for ExpiredProvider {
        async fn obtain_access_token(
            &self,
            _identity: &Identity,
            _key: &SigningKey,
        ) -> Result<AccessToken, AppError> {
            Ok(AccessToken::new("old", Utc::now() - Duration::seconds(5)))
        }
    }

    fn identity() -> Identity {
        Identity {
            issuer: "reflex-board".into(),
            installation_id: None,
        }
    }

    #[tokio::test]
    async fn test_static_provider_issues_unexpired_token() {
        let provider = StaticTokenProvider::new("abc", Duration::minutes(10));
        let token = fresh_token(&provider, &identity(), &SigningKey::default())
            .await
            .unwrap();
        assert_eq!(token.secret(), "abc");
        assert!(!token.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error() {
        let provider = StaticTokenProvider::new("  ", Duration::minutes(10));
        let err = fresh_token(&provider, &identity(), &SigningKey::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_expired_token_is_refused() {
        let err = fresh_token(&ExpiredProvider, &identity(), &SigningKey::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = AccessToken::new("super-secret", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
        let key = SigningKey::new(b"private".to_vec());
        assert_eq!(format!("{:?}", key), "SigningKey(<7 bytes>)");
    }
}
