//! Health check.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use beanpay_core::store::Store;
use tracing::warn;

use crate::AppState;
use crate::models::PingResponse;

/// `GET /ping`: report whether the database answers.
pub async fn ping_handler(State(state): State<AppState>) -> (StatusCode, Json<PingResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(PingResponse {
                database_connection: "OK".into(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "database ping failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PingResponse {
                    database_connection: e.to_string(),
                }),
            )
        }
    }
}
