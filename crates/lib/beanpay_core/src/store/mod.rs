//! Persistence seams.
//!
//! Every store the core consumes is a trait so the authenticator and guard can
//! run against Postgres in production and an in-memory store in tests.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{RefreshToken, User, UserWithPassword};
use crate::models::bills::{Bill, NewBill, NewPayment, Payment};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// The presented refresh token is no longer the latest link of its chain.
    #[error("Refresh token superseded")]
    Superseded,

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict {
                constraint: db.constraint().unwrap_or_default().to_string(),
            },
            other => StoreError::Database(other),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Constraint guarding email uniqueness.
pub const USERS_EMAIL_KEY: &str = "users_email_key";
/// Constraint guarding one payment per bill and due date.
pub const PAYMENTS_BILL_DUE_DATE_KEY: &str = "payments_bill_id_due_date_key";

/// User records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;

    async fn fetch_user_by_email(&self, email: &str) -> StoreResult<UserWithPassword>;

    async fn fetch_user_by_id(&self, id: Uuid) -> StoreResult<User>;

    /// Delete a user together with everything they own.
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;
}

/// Refresh-token records grouped into rotation chains.
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Append a link to `chain_id`. Id and creation time are store-assigned.
    async fn insert(&self, chain_id: Uuid, user_id: Uuid) -> StoreResult<RefreshToken>;

    async fn fetch_by_id(&self, id: Uuid) -> StoreResult<RefreshToken>;

    /// Latest link by creation time, ties broken by insertion order.
    async fn fetch_most_recent_in_chain(&self, chain_id: Uuid) -> StoreResult<RefreshToken>;

    /// Delete every link in the chain. `NotFound` when nothing was deleted.
    async fn delete_chain(&self, chain_id: Uuid) -> StoreResult<u64>;

    /// Append a successor to `presented`'s chain, but only while `presented`
    /// is still the latest link. Check and insert happen atomically.
    ///
    /// Fails with `Superseded` if another link has been appended since, and
    /// `NotFound` if the chain is gone.
    async fn rotate(&self, presented: &RefreshToken) -> StoreResult<RefreshToken>;

    /// Delete every chain whose latest link was created before `cutoff`.
    /// Returns the number of links removed, which may be zero.
    async fn prune_chains_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Bill records.
#[async_trait]
pub trait BillStore: Send + Sync {
    async fn list_bills(&self, user_id: Uuid) -> StoreResult<Vec<Bill>>;

    async fn fetch_bill(&self, id: Uuid) -> StoreResult<Bill>;

    async fn insert_bill(&self, bill: NewBill) -> StoreResult<Bill>;

    /// Persist the mutable columns of `bill`, returning the stored row.
    async fn update_bill(&self, bill: &Bill) -> StoreResult<Bill>;

    /// Delete a bill and its payments.
    async fn delete_bill(&self, id: Uuid) -> StoreResult<()>;
}

/// Payment records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Payments on the user's bills with `from <= due_date < to`.
    async fn list_payments(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Payment>>;

    async fn fetch_payment(&self, id: Uuid) -> StoreResult<Payment>;

    /// Insert a payment. Fails with `Conflict` when the bill is already paid
    /// for that due date.
    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment>;

    async fn delete_payment(&self, id: Uuid) -> StoreResult<()>;
}

/// Everything the HTTP layer needs from persistence.
#[async_trait]
pub trait Store: CredentialStore + RefreshTokenLedger + BillStore + PaymentStore {
    /// Round-trip to the backing store.
    async fn ping(&self) -> StoreResult<()>;
}
