//! Access tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    User,
    Admin,
}

/// Claims carried in an access token. `sub` is the user id for user tokens
/// and the admin login name for admin tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: TokenRole,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 keys and token lifetime
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }
}

pub fn generate_access_token(keys: &TokenKeys, subject: &str, role: TokenRole) -> MarketResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + keys.ttl).timestamp(),
    };
    encode(&Header::default(), &claims, &keys.encoding).map_err(|e| {
        tracing::error!(error = %e, "failed to sign access token");
        MarketError::Unauthorized
    })
}

pub fn verify_token(keys: &TokenKeys, token: &str) -> MarketResult<Claims> {
    decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("expired access token"),
                other => tracing::debug!(error = ?other, "rejected access token"),
            }
            MarketError::Unauthorized
        })
}
