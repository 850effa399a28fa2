//! Signed session tokens and the session signing secret
//!
//! # Architecture
//!
//! - Sessions are HS256 JSON Web Tokens signed with a server-side secret
//! - The secret is stored in the `settings` table under `secret_key`
//! - A token carries the user id and the user's *alternative id*; rotating
//!   the alternative id invalidates every token issued before
//! - Each token has a unique `jti` so a single token can be revoked

use crate::{Error, Result};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Settings key holding the session signing secret
pub const SECRET_KEY_SETTING: &str = "secret_key";

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: i64,
    /// User alternative id at issue time
    pub alt: String,
    /// Unique token id
    pub jti: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Signing and verification keys derived from the secret
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for a user
    pub fn issue(
        &self,
        user_id: i64,
        alternative_id: &str,
        lifetime: Duration,
    ) -> Result<(String, SessionClaims)> {
        let now = crate::time::now();
        let claims = SessionClaims {
            sub: user_id,
            alt: alternative_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Auth(format!("Failed to sign token: {}", e)))?;

        Ok((token, claims))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("Invalid token: {}", e)))
    }
}

/// Load the session signing secret, generating it on first use
///
/// A configured secret takes precedence over the stored one.
pub async fn load_secret_key(db: &SqlitePool, configured: Option<&str>) -> Result<String> {
    if let Some(secret) = configured.filter(|s| !s.is_empty()) {
        return Ok(secret.to_string());
    }

    let stored: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(SECRET_KEY_SETTING)
        .fetch_optional(db)
        .await?;

    if let Some(secret) = stored.filter(|s| !s.is_empty()) {
        return Ok(secret);
    }

    initialize_secret_key(db).await
}

/// Generate and store a random secret
///
/// Uses `INSERT OR IGNORE` followed by a read so concurrent starts agree on
/// a single value.
async fn initialize_secret_key(db: &SqlitePool) -> Result<String> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);

    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SECRET_KEY_SETTING)
        .bind(&secret)
        .execute(db)
        .await?;

    let stored: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(SECRET_KEY_SETTING)
        .fetch_one(db)
        .await?;

    info!("Initialized session signing secret");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let keys = SessionKeys::new("test-secret");
        let (token, claims) = keys.issue(7, "alt-1", Duration::minutes(5)).unwrap();

        let verified = keys.verify(&token).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.sub, 7);
        assert_eq!(verified.alt, "alt-1");
        assert_eq!(verified.exp - verified.iat, 300);
    }

    #[test]
    fn test_tokens_have_unique_ids() {
        let keys = SessionKeys::new("test-secret");
        let (_, a) = keys.issue(1, "alt", Duration::minutes(5)).unwrap();
        let (_, b) = keys.issue(1, "alt", Duration::minutes(5)).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keys = SessionKeys::new("test-secret");
        let other = SessionKeys::new("other-secret");
        let (token, _) = keys.issue(1, "alt", Duration::minutes(5)).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = SessionKeys::new("test-secret");
        let (token, _) = keys.issue(1, "alt", Duration::minutes(-5)).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let keys = SessionKeys::new("test-secret");
        assert!(keys.verify("not.a.token").is_err());
        assert!(keys.verify("").is_err());
    }
}
