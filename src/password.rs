//! Password hashing and verification using argon2id.
//!
//! Hashing is deliberately slow, so the async wrappers move the work onto the
//! blocking pool instead of stalling an executor thread.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::OnceLock;

use crate::error::ApiError;

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn hash_password_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("hash task failed: {e}")))?
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("verify task failed: {e}")))?
        .map_err(|e| ApiError::internal(format!("stored password hash is unreadable: {e}")))
}

static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// A real argon2id hash of a throwaway password, built once on first use.
fn decoy_hash() -> Result<&'static str, argon2::password_hash::Error> {
    if let Some(hash) = DECOY_HASH.get() {
        return Ok(hash);
    }
    let hash = hash_password("decoy-password-never-issued")?;
    Ok(DECOY_HASH.get_or_init(|| hash))
}

/// Runs a full verification against the decoy hash and discards the result.
/// Login calls this for unknown usernames so they cost the same as a wrong password.
pub async fn verify_decoy_blocking(password: String) -> Result<(), ApiError> {
    tokio::task::spawn_blocking(move || {
        verify_password(&password, decoy_hash()?).map(|_| ())
    })
    .await
    .map_err(|e| ApiError::internal(format!("verify task failed: {e}")))?
    .map_err(|e| ApiError::internal(format!("decoy verification failed: {e}")))
}
