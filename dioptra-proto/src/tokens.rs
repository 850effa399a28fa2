//! RS256 access tokens
//!
//! Tokens are signed with the vault's PEM private key and verified with its
//! public key. The `id` claim is the user id as a string.

use std::path::Path;

use chrono::Duration;
use dioptra_common::{Error, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::users::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8], lifetime: Duration) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| Error::Config(format!("Invalid private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| Error::Config(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            encoding,
            decoding,
            lifetime,
        })
    }

    /// Read the key pair from PEM files
    pub fn load(private_path: &Path, public_path: &Path, lifetime: Duration) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))
        };
        Self::from_pem(&read(private_path)?, &read(public_path)?, lifetime)
    }

    /// How long an issued token stays valid
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = dioptra_common::time::now();
        let claims = TokenClaims {
            id: user.id.to_string(),
            username: user.name.clone(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)
            .map_err(|e| Error::Auth(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("Invalid token: {}", e)))
    }
}
