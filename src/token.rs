use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{auth::AuthUser, models::Role};

/// Claims
///
/// Payload signed into every identity token. Everything the gates need lives here,
/// so verification never has to touch the datastore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id, as a decimal string per RFC 7519.
    pub sub: String,
    pub username: String,
    pub role: Role,
    /// Issued At (iat), seconds since the epoch.
    pub iat: u64,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: u64,
}

/// Why a token was refused. Clients see the same 401 for every variant; the kind
/// only reaches the logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature or structure is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token could not be signed: {0}")]
    Signing(String),
}

/// TokenService
///
/// Issues and verifies HS256 identity tokens with the server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a token for `user` issued now.
    pub fn issue(&self, user: &AuthUser) -> Result<String, TokenError> {
        self.issue_at(user, now_secs())
    }

    /// Signs a token for `user` with an explicit issue time (seconds since the epoch).
    pub fn issue_at(&self, user: &AuthUser, issued_at: u64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat: issued_at,
            exp: issued_at + self.ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks signature integrity, then expiry, and rebuilds the identity.
    pub fn verify(&self, token: &str) -> Result<AuthUser, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature,
            }
        })?;

        let id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::InvalidSignature)?;

        Ok(AuthUser {
            id,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
