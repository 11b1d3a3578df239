//! Ownership checks for user-owned resources.
//!
//! A resource that exists but belongs to someone else is `Forbidden`, never
//! `NotFound`. Payments have no owner column; they belong to whoever owns
//! their bill.

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::bills::{Bill, Payment};
use crate::store::{BillStore, PaymentStore, StoreError};

/// Why a caller cannot act on a resource.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Resource not found")]
    NotFound,

    #[error("Resource belongs to another user")]
    Forbidden,

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AccessError::NotFound,
            other => AccessError::Store(other),
        }
    }
}

/// Something with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

impl Owned for Bill {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Pass `resource` through if `caller` owns it.
pub fn ensure_owner<T: Owned>(caller: Uuid, resource: T) -> Result<T, AccessError> {
    if resource.owner_id() == caller {
        Ok(resource)
    } else {
        warn!(caller = %caller, owner = %resource.owner_id(), "cross-user access denied");
        Err(AccessError::Forbidden)
    }
}

/// Fetch a bill the caller owns.
pub async fn owned_bill<S>(store: &S, caller: Uuid, bill_id: Uuid) -> Result<Bill, AccessError>
where
    S: BillStore + ?Sized,
{
    let bill = store.fetch_bill(bill_id).await?;
    ensure_owner(caller, bill)
}

/// Fetch a payment whose bill the caller owns.
pub async fn owned_payment<S>(
    store: &S,
    caller: Uuid,
    payment_id: Uuid,
) -> Result<Payment, AccessError>
where
    S: BillStore + PaymentStore + ?Sized,
{
    let payment = store.fetch_payment(payment_id).await?;
    owned_bill(store, caller, payment.bill_id).await?;
    Ok(payment)
}
