//! Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    BillStore, CredentialStore, PaymentStore, RefreshTokenLedger, Store, StoreError, StoreResult,
};
use crate::models::auth::{RefreshToken, User, UserWithPassword};
use crate::models::bills::{Bill, NewBill, NewPayment, Payment};

const USER_COLUMNS: &str = "id, email, created_at, updated_at";
const REFRESH_TOKEN_COLUMNS: &str = "id, chain_id, user_id, created_at";
const BILL_COLUMNS: &str = "id, user_id, name, payment_url, frequency, estimated_total_due, \
                            first_due_date, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, bill_id, due_date, total_paid, created_at, updated_at";

/// Store over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Serialize all writers of one chain for the rest of the transaction.
async fn lock_chain(tx: &mut Transaction<'_, Postgres>, chain_id: Uuid) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(chain_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn latest_in_chain(
    tx: &mut Transaction<'_, Postgres>,
    chain_id: Uuid,
) -> StoreResult<Option<RefreshToken>> {
    let row = sqlx::query_as::<_, RefreshToken>(&format!(
        "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens \
         WHERE chain_id = $1 ORDER BY created_at DESC, seq DESC LIMIT 1"
    ))
    .bind(chain_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

fn expect_deleted(rows: u64) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn fetch_user_by_email(&self, email: &str) -> StoreResult<UserWithPassword> {
        let user = sqlx::query_as::<_, UserWithPassword>(&format!(
            "SELECT {USER_COLUMNS}, password FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn fetch_user_by_id(&self, id: Uuid) -> StoreResult<User> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        // Bills, payments and refresh tokens go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenLedger for PgStore {
    async fn insert(&self, chain_id: Uuid, user_id: Uuid) -> StoreResult<RefreshToken> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens (chain_id, user_id) VALUES ($1, $2) \
             RETURNING {REFRESH_TOKEN_COLUMNS}"
        ))
        .bind(chain_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    async fn fetch_by_id(&self, id: Uuid) -> StoreResult<RefreshToken> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    async fn fetch_most_recent_in_chain(&self, chain_id: Uuid) -> StoreResult<RefreshToken> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens \
             WHERE chain_id = $1 ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .bind(chain_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete_chain(&self, chain_id: Uuid) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        lock_chain(&mut tx, chain_id).await?;
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE chain_id = $1")
            .bind(chain_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        expect_deleted(deleted)?;
        Ok(deleted)
    }

    async fn rotate(&self, presented: &RefreshToken) -> StoreResult<RefreshToken> {
        let mut tx = self.pool.begin().await?;
        lock_chain(&mut tx, presented.chain_id).await?;

        match latest_in_chain(&mut tx, presented.chain_id).await? {
            None => return Err(StoreError::NotFound),
            Some(latest) if latest.id != presented.id => return Err(StoreError::Superseded),
            Some(_) => {}
        }

        let next = sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens (chain_id, user_id) VALUES ($1, $2) \
             RETURNING {REFRESH_TOKEN_COLUMNS}"
        ))
        .bind(presented.chain_id)
        .bind(presented.user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn prune_chains_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let pruned = sqlx::query(
            "DELETE FROM refresh_tokens WHERE chain_id IN ( \
                 SELECT chain_id FROM refresh_tokens \
                 GROUP BY chain_id HAVING max(created_at) < $1)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(pruned)
    }
}

#[async_trait]
impl BillStore for PgStore {
    async fn list_bills(&self, user_id: Uuid) -> StoreResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn fetch_bill(&self, id: Uuid) -> StoreResult<Bill> {
        let bill =
            sqlx::query_as::<_, Bill>(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(bill)
    }

    async fn insert_bill(&self, bill: NewBill) -> StoreResult<Bill> {
        let bill = sqlx::query_as::<_, Bill>(&format!(
            "INSERT INTO bills \
               (user_id, name, payment_url, frequency, estimated_total_due, first_due_date) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {BILL_COLUMNS}"
        ))
        .bind(bill.user_id)
        .bind(&bill.name)
        .bind(&bill.payment_url)
        .bind(bill.frequency.as_str())
        .bind(bill.estimated_total_due)
        .bind(bill.first_due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(bill)
    }

    async fn update_bill(&self, bill: &Bill) -> StoreResult<Bill> {
        let bill = sqlx::query_as::<_, Bill>(&format!(
            "UPDATE bills SET \
               name = $1, payment_url = $2, frequency = $3, \
               estimated_total_due = $4, first_due_date = $5 \
             WHERE id = $6 \
             RETURNING {BILL_COLUMNS}"
        ))
        .bind(&bill.name)
        .bind(&bill.payment_url)
        .bind(bill.frequency.as_str())
        .bind(bill.estimated_total_due)
        .bind(bill.first_due_date)
        .bind(bill.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(bill)
    }

    async fn delete_bill(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result.rows_affected())
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn list_payments(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE bill_id IN (SELECT id FROM bills WHERE user_id = $1) \
               AND due_date >= $2 AND due_date < $3 \
             ORDER BY due_date"
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn fetch_payment(&self, id: Uuid) -> StoreResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn insert_payment(&self, payment: NewPayment) -> StoreResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "INSERT INTO payments (bill_id, due_date, total_paid) VALUES ($1, $2, $3) \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.bill_id)
        .bind(payment.due_date)
        .bind(payment.total_paid)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn delete_payment(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
