//! In-memory store for tests.
//!
//! Mirrors the Postgres schema's constraints: unique emails, one payment per
//! bill and due date, and cascading deletes from users to bills, payments and
//! refresh tokens. A single mutex makes every operation atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    BillStore, CredentialStore, PAYMENTS_BILL_DUE_DATE_KEY, PaymentStore, RefreshTokenLedger,
    Store, StoreError, StoreResult, USERS_EMAIL_KEY,
};
use crate::clock::{Clock, SystemClock};
use crate::models::auth::{RefreshToken, User, UserWithPassword};
use crate::models::bills::{Bill, NewBill, NewPayment, Payment};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserWithPassword>,
    /// Insertion order is the tie-breaker for equal `created_at`.
    refresh_tokens: Vec<RefreshToken>,
    bills: HashMap<Uuid, Bill>,
    payments: HashMap<Uuid, Payment>,
}

impl Tables {
    fn latest_in_chain(&self, chain_id: Uuid) -> Option<&RefreshToken> {
        self.refresh_tokens
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .max_by_key(|t| t.created_at)
    }

    fn push_link(&mut self, chain_id: Uuid, user_id: Uuid, clock: &dyn Clock) -> RefreshToken {
        let token = RefreshToken {
            id: Uuid::new_v4(),
            chain_id,
            user_id,
            created_at: clock.now(),
        };
        self.refresh_tokens.push(token.clone());
        token
    }

    fn remove_bill(&mut self, id: Uuid) -> bool {
        self.payments.retain(|_, p| p.bill_id != id);
        self.bills.remove(&id).is_some()
    }
}

/// Store that keeps every table in process memory.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock,
        }
    }

    /// Every link currently stored for `chain_id`, oldest first.
    pub async fn chain(&self, chain_id: Uuid) -> Vec<RefreshToken> {
        self.tables
            .lock()
            .await
            .refresh_tokens
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect()
    }

    /// Distinct chain ids belonging to `user_id`.
    pub async fn chains_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        let tables = self.tables.lock().await;
        let mut chains: Vec<Uuid> = Vec::new();
        for token in tables.refresh_tokens.iter().filter(|t| t.user_id == user_id) {
            if !chains.contains(&token.chain_id) {
                chains.push(token.chain_id);
            }
        }
        chains
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.user.email == email) {
            return Err(StoreError::Conflict {
                constraint: USERS_EMAIL_KEY.to_string(),
            });
        }
        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserWithPassword {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn fetch_user_by_email(&self, email: &str) -> StoreResult<UserWithPassword> {
        let tables = self.tables.lock().await;
        tables
            .users
            .values()
            .find(|u| u.user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn fetch_user_by_id(&self, id: Uuid) -> StoreResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&id)
            .map(|u| u.user.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        let owned: Vec<Uuid> = tables
            .bills
            .values()
            .filter(|b| b.user_id == id)
            .map(|b| b.id)
            .collect();
        for bill_id in owned {
            tables.remove_bill(bill_id);
        }
        tables.refresh_tokens.retain(|t| t.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenLedger for MemoryStore {
    async fn insert(&self, chain_id: Uuid, user_id: Uuid) -> StoreResult<RefreshToken> {
        let mut tables = self.tables.lock().await;
        Ok(tables.push_link(chain_id, user_id, self.clock.as_ref()))
    }

    async fn fetch_by_id(&self, id: Uuid) -> StoreResult<RefreshToken> {
        let tables = self.tables.lock().await;
        tables
            .refresh_tokens
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn fetch_most_recent_in_chain(&self, chain_id: Uuid) -> StoreResult<RefreshToken> {
        let tables = self.tables.lock().await;
        tables
            .latest_in_chain(chain_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_chain(&self, chain_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|t| t.chain_id != chain_id);
        let deleted = (before - tables.refresh_tokens.len()) as u64;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(deleted)
    }

    async fn rotate(&self, presented: &RefreshToken) -> StoreResult<RefreshToken> {
        let mut tables = self.tables.lock().await;
        match tables.latest_in_chain(presented.chain_id) {
            None => return Err(StoreError::NotFound),
            Some(latest) if latest.id != presented.id => return Err(StoreError::Superseded),
            Some(_) => {}
        }
        Ok(tables.push_link(presented.chain_id, presented.user_id, self.clock.as_ref()))
    }

    async fn prune_chains_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for token in &tables.refresh_tokens {
            let newest = latest.entry(token.chain_id).or_insert(token.created_at);
            *newest = (*newest).max(token.created_at);
        }
        let before = tables.refresh_tokens.len();
        tables
            .refresh_tokens
            .retain(|t| latest.get(&t.chain_id).is_some_and(|newest| *newest >= cutoff));
        Ok((before - tables.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl BillStore for MemoryStore {
    async fn list_bills(&self, user_id: Uuid) -> StoreResult<Vec<Bill>> {
        let tables = self.tables.lock().await;
        let mut bills: Vec<Bill> = tables
            .bills
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bills.sort_by_key(|b| b.created_at);
        Ok(bills)
    }

    async fn fetch_bill(&self, id: Uuid) -> StoreResult<Bill> {
        let tables = self.tables.lock().await;
        tables.bills.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert_bill(&self, bill: NewBill) -> StoreResult<Bill> {
        let mut tables = self.tables.lock().await;
        let now = self.clock.now();
        let bill = Bill {
            id: Uuid::new_v4(),
            user_id: bill.user_id,
            name: bill.name,
            payment_url: bill.payment_url,
            frequency: bill.frequency,
            estimated_total_due: bill.estimated_total_due,
            first_due_date: bill.first_due_date,
            created_at: now,
            updated_at: now,
        };
        tables.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn update_bill(&self, bill: &Bill) -> StoreResult<Bill> {
        let mut tables = self.tables.lock().await;
        let now = self.clock.now();
        let stored = tables.bills.get_mut(&bill.id).ok_or(StoreError::NotFound)?;
        stored.name = bill.name.clone();
        stored.payment_url = bill.payment_url.clone();
        stored.frequency = bill.frequency;
        stored.estimated_total_due = bill.estimated_total_due;
        stored.first_due_date = bill.first_due_date;
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn delete_bill(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.remove_bill(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn list_payments(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.lock().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| {
                tables
                    .bills
                    .get(&p.bill_id)
                    .is_some_and(|b| b.user_id == user_id)
            })
            .filter(|p| p.due_date >= from && p.due_date < to)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.due_date);
        Ok(payments)
    }

    async fn fetch_payment(&self, id: Uuid) -> StoreResult<Payment> {
        let tables = self.tables.lock().await;
        tables.payments.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables
            .payments
            .values()
            .any(|p| p.bill_id == payment.bill_id && p.due_date == payment.due_date);
        if duplicate {
            return Err(StoreError::Conflict {
                constraint: PAYMENTS_BILL_DUE_DATE_KEY.to_string(),
            });
        }
        let now = self.clock.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            bill_id: payment.bill_id,
            due_date: payment.due_date,
            total_paid: payment.total_paid,
            created_at: now,
            updated_at: now,
        };
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn delete_payment(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .payments
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
