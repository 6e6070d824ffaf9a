use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against its stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Generate an opaque bearer token.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a widget API key: prefix, a short email-derived fragment for
/// per-account uniqueness, then random material.
pub fn generate_api_key(prefix: &str, email: &str) -> String {
    let digest = Sha256::digest(email.as_bytes());
    let email_part = &hex::encode(digest)[..8];
    let random = uuid::Uuid::new_v4().to_string().replace('-', "");
    format!("{prefix}_{email_part}_{random}")
}
