//! Bill handlers. Every bill is scoped to the authenticated caller.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use beanpay_core::guard::owned_bill;
use beanpay_core::models::bills::{Bill, NewBill};
use beanpay_core::store::BillStore;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{CreateBillRequest, UpdateBillRequest, parse_date, parse_frequency};
use crate::services::validation::{ResourceId, ValidatedJson};

/// `GET /bills`: every bill the caller owns.
pub async fn list_bills_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Bill>>> {
    let bills = state.store.list_bills(user.user_id).await?;
    Ok(Json(bills))
}

/// `POST /bills`: create a bill for the caller.
pub async fn create_bill_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(body): ValidatedJson<CreateBillRequest>,
) -> AppResult<Json<Bill>> {
    let new_bill = NewBill {
        user_id: user.user_id,
        frequency: parse_frequency(&body.frequency)?,
        first_due_date: parse_date(&body.first_due_date)?,
        estimated_total_due: body.estimated_total_due.unwrap_or_default(),
        name: body.name,
        payment_url: body.payment_url,
    };
    let bill = state.store.insert_bill(new_bill).await?;
    info!(user_id = %user.user_id, bill_id = %bill.id, "created bill");
    Ok(Json(bill))
}

/// `GET /bills/{id}`
pub async fn get_bill_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ResourceId(bill_id): ResourceId,
) -> AppResult<Json<Bill>> {
    let bill = owned_bill(state.store.as_ref(), user.user_id, bill_id).await?;
    Ok(Json(bill))
}

/// `PUT /bills/{id}`: apply the fields present in the body.
pub async fn update_bill_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ResourceId(bill_id): ResourceId,
    ValidatedJson(body): ValidatedJson<UpdateBillRequest>,
) -> AppResult<Json<Bill>> {
    let mut bill = owned_bill(state.store.as_ref(), user.user_id, bill_id).await?;
    body.into_changes()?.apply_to(&mut bill);
    let bill = state.store.update_bill(&bill).await?;
    Ok(Json(bill))
}

/// `DELETE /bills/{id}`: remove a bill and its payments.
pub async fn delete_bill_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ResourceId(bill_id): ResourceId,
) -> AppResult<StatusCode> {
    owned_bill(state.store.as_ref(), user.user_id, bill_id).await?;
    state.store.delete_bill(bill_id).await?;
    info!(user_id = %user.user_id, bill_id = %bill_id, "deleted bill");
    Ok(StatusCode::OK)
}
