//! Ledger and constraint behaviour against a real Postgres.
//!
//! Run with `DATABASE_URL` pointing at a scratch server and `--ignored`.

use beanpay_core::models::bills::{Frequency, NewBill, NewPayment};
use beanpay_core::store::{
    BillStore, CredentialStore, PAYMENTS_BILL_DUE_DATE_KEY, PaymentStore, PgStore,
    RefreshTokenLedger, StoreError, USERS_EMAIL_KEY,
};
use chrono::{Duration, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn most_recent_link_follows_insertion_order(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = store.insert_user("a@example.com", "hash").await.unwrap();
    let chain = Uuid::new_v4();

    store.insert(chain, user.id).await.unwrap();
    let second = store.insert(chain, user.id).await.unwrap();
    assert_eq!(
        store.fetch_most_recent_in_chain(chain).await.unwrap().id,
        second.id
    );

    assert_eq!(store.delete_chain(chain).await.unwrap(), 2);
    assert!(matches!(
        store.delete_chain(chain).await,
        Err(StoreError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn prune_removes_whole_chains_by_latest_link(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = store.insert_user("a@example.com", "hash").await.unwrap();
    let t0 = store.insert(Uuid::new_v4(), user.id).await.unwrap();
    let t1 = store.rotate(&t0).await.unwrap();

    assert_eq!(
        store.prune_chains_before(t0.created_at).await.unwrap(),
        0
    );
    assert_eq!(
        store
            .prune_chains_before(t1.created_at + Duration::seconds(1))
            .await
            .unwrap(),
        2
    );
    assert!(matches!(
        store.fetch_by_id(t1.id).await,
        Err(StoreError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_rotations_let_one_through(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = store.insert_user("a@example.com", "hash").await.unwrap();
    let t0 = store.insert(Uuid::new_v4(), user.id).await.unwrap();

    let (a, b) = tokio::join!(store.rotate(&t0), store.rotate(&t0));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(StoreError::Superseded)))
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn unique_constraints_surface_their_names(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = store.insert_user("dup@example.com", "hash").await.unwrap();
    let err = store.insert_user("dup@example.com", "hash").await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref constraint } if constraint == USERS_EMAIL_KEY));

    let bill = store
        .insert_bill(NewBill {
            user_id: user.id,
            name: "Gas".into(),
            payment_url: "https://gas.example.com".into(),
            frequency: Frequency::Biannually,
            estimated_total_due: 300.0,
            first_due_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        })
        .await
        .unwrap();
    let payment = NewPayment {
        bill_id: bill.id,
        due_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        total_paid: 290.0,
    };
    store.insert_payment(payment.clone()).await.unwrap();
    let err = store.insert_payment(payment).await.unwrap_err();
    assert!(
        matches!(err, StoreError::Conflict { ref constraint } if constraint == PAYMENTS_BILL_DUE_DATE_KEY)
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_a_user_cascades(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = store.insert_user("gone@example.com", "hash").await.unwrap();
    let token = store.insert(Uuid::new_v4(), user.id).await.unwrap();
    let bill = store
        .insert_bill(NewBill {
            user_id: user.id,
            name: "Internet".into(),
            payment_url: "https://isp.example.com".into(),
            frequency: Frequency::Monthly,
            estimated_total_due: 60.0,
            first_due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        })
        .await
        .unwrap();

    store.delete_user(user.id).await.unwrap();

    assert!(matches!(
        store.fetch_by_id(token.id).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.fetch_bill(bill.id).await,
        Err(StoreError::NotFound)
    ));
}
