//! JWT access-token signing and verification.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::auth::AccessClaims;

/// The only algorithm tokens may be signed or verified with.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Access-token verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatoryError {
    #[error("signature is invalid")]
    InvalidSignature,

    #[error("unexpected signing algorithm")]
    UnexpectedAlgorithm,

    #[error("token is expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("jwt encode: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for SignatoryError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => SignatoryError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                SignatoryError::UnexpectedAlgorithm
            }
            ErrorKind::ExpiredSignature => SignatoryError::Expired,
            _ => SignatoryError::Malformed,
        }
    }
}

/// Issues and verifies HS256 access tokens with a key supplied at construction.
///
/// Verification never touches a store: it is a signature check plus a clock
/// comparison, so a token cannot be revoked before it expires.
pub struct TokenSignatory {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenSignatory {
    pub fn new(signing_key: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            clock,
        }
    }

    /// Sign a token for `user_id` that expires at `expires_at` (second precision).
    pub fn issue(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<String, SignatoryError> {
        let claims = AccessClaims {
            user_id,
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| SignatoryError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, SignatoryError> {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked below against our clock: the library allows
        // leeway and accepts `exp == now`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<AccessClaims>(token, &self.decoding, &validation)?.claims;
        if self.clock.now().timestamp() >= claims.exp {
            return Err(SignatoryError::Expired);
        }
        Ok(claims)
    }
}

/// Resolve the signing key: env var `JWT_SIGNING_KEY` → persisted file → generated.
pub fn resolve_signing_key() -> String {
    if let Ok(key) = std::env::var("JWT_SIGNING_KEY")
        && !key.is_empty()
    {
        return key;
    }
    let key_path = signing_key_path();
    if let Ok(existing) = std::fs::read_to_string(&key_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let key: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = key_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(&key_path, &key) {
        Ok(()) => info!(path = %key_path.display(), "generated new JWT signing key"),
        Err(e) => warn!(
            path = %key_path.display(),
            error = %e,
            "could not persist generated JWT signing key; tokens will not survive a restart"
        ),
    }
    key
}

/// Path to the persisted signing key file.
fn signing_key_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beanpay")
        .join("jwt-signing-key")
}
