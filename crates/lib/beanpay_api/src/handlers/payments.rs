//! Payment handlers. A payment belongs to whoever owns its bill.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use beanpay_core::guard::{AccessError, owned_bill, owned_payment};
use beanpay_core::models::bills::{NewPayment, Payment};
use beanpay_core::store::PaymentStore;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{CreatePaymentRequest, PaymentRangeQuery, parse_bill_id, parse_date};
use crate::services::validation::{ResourceId, ValidatedJson, ValidatedQuery};

const NO_SUCH_BILL: &str = "There is no Bill with the specified 'BillId'.";

/// `GET /payments?from=YYYY-MM-DD&to=YYYY-MM-DD`
pub async fn list_payments_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedQuery(query): ValidatedQuery<PaymentRangeQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    let from = parse_date(query.from.as_deref().unwrap_or_default())?;
    let to = parse_date(query.to.as_deref().unwrap_or_default())?;
    let payments = state.store.list_payments(user.user_id, from, to).await?;
    Ok(Json(payments))
}

/// `POST /payments`: record a payment on one of the caller's bills.
pub async fn create_payment_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ValidatedJson(body): ValidatedJson<CreatePaymentRequest>,
) -> AppResult<Json<Payment>> {
    let due_date = parse_date(&body.due_date)?;
    let bill_id = parse_bill_id(&body.bill_id).ok_or_else(|| AppError::validation(NO_SUCH_BILL))?;
    let bill = match owned_bill(state.store.as_ref(), user.user_id, bill_id).await {
        Ok(bill) => bill,
        Err(AccessError::NotFound) => return Err(AppError::validation(NO_SUCH_BILL)),
        Err(e) => return Err(e.into()),
    };

    let payment = state
        .store
        .insert_payment(NewPayment {
            bill_id: bill.id,
            due_date,
            total_paid: body.total_paid.unwrap_or_default(),
        })
        .await?;
    info!(user_id = %user.user_id, payment_id = %payment.id, "recorded payment");
    Ok(Json(payment))
}

/// `DELETE /payments/{id}`
pub async fn delete_payment_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ResourceId(payment_id): ResourceId,
) -> AppResult<StatusCode> {
    owned_payment(state.store.as_ref(), user.user_id, payment_id).await?;
    state.store.delete_payment(payment_id).await?;
    Ok(StatusCode::OK)
}
