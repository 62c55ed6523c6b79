//! JWT minting and verification (§4.3). Access tokens are short-lived and
//! stateless; refresh tokens are opaque random strings whose hash is
//! persisted in `refresh_tokens` so they can be revoked individually.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

pub struct RefreshToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: chrono::DateTime<Utc>,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        TokenService {
            encoding_key: EncodingKey::from_secret(&config.jwt_secret),
            decoding_key: DecodingKey::from_secret(&config.jwt_secret),
            access_ttl: Duration::seconds(config.jwt_access_ttl_secs),
            refresh_ttl: Duration::seconds(config.jwt_refresh_ttl_secs),
        }
    }

    pub fn mint_access(&self, user_id: &str, username: &str, is_admin: bool) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            is_admin,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to mint access token: {e}")))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        let validation = Validation { leeway: 60, ..Validation::default() };
        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::unauthorized("invalid or expired access token"))
    }

    /// Generates a fresh opaque refresh token. The raw value is returned to
    /// the client once; only its hash is ever stored.
    pub fn mint_refresh(&self) -> RefreshToken {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let hash = hash_refresh_token(&raw);
        RefreshToken { raw, hash, expires_at: Utc::now() + self.refresh_ttl }
    }
}

/// Refresh tokens are already high-entropy random values, so a plain digest
/// (no salt) is enough to let the database compare hashes instead of raw
/// secrets.
pub fn hash_refresh_token(raw: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
