//! Password hashing via bcrypt.

use super::AuthError;

/// bcrypt cost factor used when none is configured.
pub const DEFAULT_BCRYPT_COST: u32 = 14;

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Password(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Password(format!("bcrypt verify: {e}")))
}
