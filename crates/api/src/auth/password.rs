//! Password encoding
//!
//! Providers never compare secrets themselves; they go through a
//! [`PasswordEncoder`] so the storage format can change without touching
//! authentication code.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use subtle::ConstantTimeEq;

/// Encodes raw secrets for storage and checks submitted secrets against them
pub trait PasswordEncoder: Send + Sync {
    fn encode(&self, raw: &str) -> Result<String, PasswordError>;

    /// `false` for any mismatch, including an unparseable stored value
    fn matches(&self, raw: &str, encoded: &str) -> bool;
}

/// Argon2id encoder (default)
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordEncoder;

impl PasswordEncoder for Argon2PasswordEncoder {
    fn encode(&self, raw: &str) -> Result<String, PasswordError> {
        hash_password(raw)
    }

    fn matches(&self, raw: &str, encoded: &str) -> bool {
        match verify_password(raw, encoded) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}

/// Stores secrets as-is and compares them in constant time.
///
/// Only suitable for fixtures and local development.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextPasswordEncoder;

impl PasswordEncoder for PlainTextPasswordEncoder {
    fn encode(&self, raw: &str) -> Result<String, PasswordError> {
        Ok(raw.to_string())
    }

    fn matches(&self, raw: &str, encoded: &str) -> bool {
        raw.as_bytes().ct_eq(encoded.as_bytes()).into()
    }
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against an Argon2 hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Encode an unguessable random secret.
///
/// Compared against when a principal does not exist, so unknown usernames take
/// as long to reject as wrong passwords.
pub fn generate_impossible_hash(encoder: &dyn PasswordEncoder) -> Result<String, PasswordError> {
    use argon2::password_hash::rand_core::RngCore;

    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);
    let random_password: String = random_bytes.iter().map(|b| format!("{b:02x}")).collect();

    encoder.encode(&random_password)
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}
