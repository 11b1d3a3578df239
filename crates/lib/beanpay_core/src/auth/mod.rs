//! Authentication: access-token signing, password hashing, and the login /
//! refresh orchestration built on the refresh-token ledger.

pub mod authenticator;
pub mod jwt;
pub mod password;

use thiserror::Error;

use crate::store::StoreError;

pub use authenticator::{Authenticator, ChainState, IssuedTokens, TokenLifetimes};
pub use jwt::{SignatoryError, TokenSignatory};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Deliberately uninformative: bad credentials and bad/stale/expired
    /// refresh tokens all collapse here.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Token error: {0}")]
    Signatory(#[from] SignatoryError),

    #[error("Password hashing error: {0}")]
    Password(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}
