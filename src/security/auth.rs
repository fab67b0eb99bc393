//! Bearer credential validation and revocation.
//!
//! # Responsibilities
//! - Decode and verify JWT access credentials
//! - Reject revoked credentials (`blacklist:{token}` in the shared cache)
//! - Revoke credentials for their remaining lifetime
//!
//! # Design Decisions
//! - The revocation lookup runs before signature work
//! - Only `type = "access"` credentials are accepted; refresh credentials are not
//! - A revocation-list outage fails closed

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheError, SharedCache};
use crate::config::AuthConfig;
use crate::security::identity::Identity;

const REVOCATION_PREFIX: &str = "blacklist:";
const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    Missing,

    #[error("credential has been revoked")]
    Revoked,

    #[error("credential has expired")]
    Expired,

    #[error("invalid credential: {0}")]
    InvalidToken(String),

    #[error("credential is not an access token")]
    WrongType,

    #[error("credential has no subject")]
    MissingSubject,

    #[error("revocation list unavailable: {0}")]
    RevocationCheck(#[source] CacheError),

    #[error("revocation failed: {0}")]
    RevocationWrite(#[source] CacheError),

    #[error("invalid key configuration: {0}")]
    KeyConfiguration(String),
}

impl AuthError {
    /// Label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Revoked => "revoked",
            AuthError::Expired => "expired",
            AuthError::InvalidToken(_) => "invalid",
            AuthError::WrongType => "wrong_type",
            AuthError::MissingSubject => "missing_subject",
            AuthError::RevocationCheck(_) | AuthError::RevocationWrite(_) => "cache_error",
            AuthError::KeyConfiguration(_) => "key_configuration",
        }
    }
}

/// Claims issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: Option<String>,

    /// Numeric or string user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry, seconds since the epoch.
    pub exp: i64,

    /// `access` or `refresh`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    fn subject_id(&self) -> Option<String> {
        match &self.user_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => self.sub.clone(),
        }
    }
}

/// Validates bearer credentials against the signing key and revocation list.
pub struct CredentialValidator {
    key: DecodingKey,
    validation: Validation,
    cache: Arc<dyn SharedCache>,
}

impl CredentialValidator {
    pub fn from_config(config: &AuthConfig, cache: Arc<dyn SharedCache>) -> Result<Self, AuthError> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|e| AuthError::KeyConfiguration(format!("{}: {e}", config.algorithm)))?;

        let key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(config.secret_key.as_bytes())
            }
            _ => {
                let pem = config.public_key_pem.as_deref().ok_or_else(|| {
                    AuthError::KeyConfiguration(format!("{} requires a public key", config.algorithm))
                })?;
                let parsed = match algorithm {
                    Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
                    Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
                    _ => DecodingKey::from_rsa_pem(pem.as_bytes()),
                };
                parsed.map_err(|e| AuthError::KeyConfiguration(e.to_string()))?
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;

        Ok(Self {
            key,
            validation,
            cache,
        })
    }

    /// Validate an access credential and return its identity.
    pub async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if self.is_revoked(token).await? {
            return Err(AuthError::Revoked);
        }

        let claims = self.decode_claims(token, &self.validation)?;

        if claims.token_type.as_deref() != Some(ACCESS_TOKEN_TYPE) {
            return Err(AuthError::WrongType);
        }

        let display_name = claims.sub.clone().ok_or(AuthError::MissingSubject)?;
        let subject_id = claims.subject_id().ok_or(AuthError::MissingSubject)?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".to_string()))?;

        Ok(Identity {
            subject_id,
            display_name,
            expires_at,
        })
    }

    /// Put `token` on the revocation list for at least `ttl`.
    ///
    /// A token that decodes stays listed for its remaining lifetime even when
    /// `ttl` is shorter. Returns the TTL actually written.
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<Duration, AuthError> {
        let ttl = match self.remaining_lifetime(token) {
            Ok(Some(remaining)) => ttl.max(remaining),
            _ => ttl,
        };
        self.write_revocation(token, ttl).await?;
        Ok(ttl)
    }

    /// Revoke `token` until its natural expiry.
    ///
    /// The signature is verified but expiry is not enforced. Returns the TTL
    /// used, or `None` when the token has already expired and needs no entry.
    pub async fn revoke_for_remaining_lifetime(&self, token: &str) -> Result<Option<Duration>, AuthError> {
        let Some(ttl) = self.remaining_lifetime(token)? else {
            return Ok(None);
        };
        self.write_revocation(token, ttl).await?;
        Ok(Some(ttl))
    }

    /// Time until `token` expires; `None` once it has.
    fn remaining_lifetime(&self, token: &str) -> Result<Option<Duration>, AuthError> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        let claims = self.decode_claims(token, &validation)?;

        let remaining = claims.exp - Utc::now().timestamp();
        Ok((remaining > 0).then(|| Duration::from_secs(remaining.unsigned_abs())))
    }

    async fn write_revocation(&self, token: &str, ttl: Duration) -> Result<(), AuthError> {
        self.cache
            .set_ex(&revocation_key(token), "true", ttl)
            .await
            .map_err(AuthError::RevocationWrite)?;

        tracing::info!(ttl_secs = ttl.as_secs(), "Credential revoked");
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        self.cache
            .get(&revocation_key(token))
            .await
            .map(|entry| entry.is_some())
            .map_err(AuthError::RevocationCheck)
    }

    fn decode_claims(&self, token: &str, validation: &Validation) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

fn revocation_key(token: &str) -> String {
    format!("{REVOCATION_PREFIX}{token}")
}

/// Extract the credential from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}


#[cfg(test)]
mod tests {
    use super::test_tokens::{issue, issue_with_secret, SECRET};
    use super::*;
    use crate::cache::InMemoryCache;

    fn validator() -> CredentialValidator {
        let config = AuthConfig {
            secret_key: SECRET.to_string(),
            ..AuthConfig::default()
        };
        CredentialValidator::from_config(&config, Arc::new(InMemoryCache::new())).unwrap()
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let identity = validator()
            .validate(&issue("alice", Some(42), "access", 600))
            .await
            .unwrap();

        assert_eq!(identity.subject_id, "42");
        assert_eq!(identity.display_name, "alice");
        assert!(identity.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_subject_falls_back_to_sub() {
        let identity = validator()
            .validate(&issue("bob", None, "access", 600))
            .await
            .unwrap();
        assert_eq!(identity.subject_id, "bob");
    }

    #[tokio::test]
    async fn test_rejects_expired() {
        let result = validator().validate(&issue("alice", Some(1), "access", -120)).await;
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_rejects_refresh_token() {
        let result = validator().validate(&issue("alice", Some(1), "refresh", 600)).await;
        assert!(matches!(result, Err(AuthError::WrongType)));
    }

    #[tokio::test]
    async fn test_rejects_bad_signature_and_garbage() {
        let v = validator();
        let forged = issue_with_secret("other-secret", "alice", Some(1), "access", 600);
        assert!(matches!(v.validate(&forged).await, Err(AuthError::InvalidToken(_))));
        assert!(matches!(v.validate("not.a.jwt").await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_revoked_token_rejected_until_expiry() {
        let v = validator();
        let token = issue("alice", Some(42), "access", 600);
        assert!(v.validate(&token).await.is_ok());

        let ttl = v.revoke_for_remaining_lifetime(&token).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(600));
        assert!(ttl >= Duration::from_secs(590));

        for _ in 0..3 {
            assert!(matches!(v.validate(&token).await, Err(AuthError::Revoked)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_revocation_ttl_extends_to_token_lifetime() {
        let v = validator();
        let token = issue("alice", Some(42), "access", 600);

        let ttl = v.revoke(&token, Duration::from_secs(1)).await.unwrap();
        assert!(ttl >= Duration::from_secs(590));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(v.validate(&token).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_longer_revocation_ttl_is_kept() {
        let v = validator();
        let token = issue("alice", Some(42), "access", 60);
        let ttl = v.revoke(&token, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(ttl, Duration::from_secs(3600));

        // Undecodable tokens are listed for exactly the requested time.
        let ttl = v.revoke("not.a.jwt", Duration::from_secs(5)).await.unwrap();
        assert_eq!(ttl, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_expired_token_needs_no_revocation_entry() {
        let v = validator();
        let token = issue("alice", Some(42), "access", -10);
        assert_eq!(v.revoke_for_remaining_lifetime(&token).await.unwrap(), None);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn test_asymmetric_algorithm_without_key_fails() {
        let config = AuthConfig {
            algorithm: "RS256".into(),
            ..AuthConfig::default()
        };
        let result = CredentialValidator::from_config(&config, Arc::new(InMemoryCache::new()));
        assert!(matches!(result, Err(AuthError::KeyConfiguration(_))));
    }
}
