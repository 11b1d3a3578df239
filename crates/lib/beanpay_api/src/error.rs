//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use beanpay_core::auth::AuthError;
use beanpay_core::guard::AccessError;
use beanpay_core::store::{PAYMENTS_BILL_DUE_DATE_KEY, StoreError, USERS_EMAIL_KEY};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    /// One readable message per offending field.
    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            AppError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Invalid request".to_string(),
                details,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
                Vec::new(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Forbidden".to_string(),
                Vec::new(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Not found".to_string(),
                Vec::new(),
            ),
            AppError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message, Vec::new()),
            AppError::Internal(cause) => {
                error!(cause = %cause, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    Vec::new(),
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
            details,
        });
        (status, body).into_response()
    }
}

/// Client-facing message for a violated unique constraint.
fn conflict_message(constraint: &str) -> String {
    match constraint {
        USERS_EMAIL_KEY => "Email is already in use by another user".into(),
        PAYMENTS_BILL_DUE_DATE_KEY => {
            "The bill has already been paid for the specified due date.".into()
        }
        other => format!("Conflicting record ({other})"),
    }
}

impl From<validator::ValidationError> for AppError {
    fn from(e: validator::ValidationError) -> Self {
        let message = match e.message {
            Some(message) => message.to_string(),
            None => format!("Invalid value ({})", e.code),
        };
        AppError::Validation(vec![message])
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict { constraint } => AppError::Conflict(conflict_message(&constraint)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized => AppError::Unauthorized,
            AuthError::Store(e) => AppError::from(e),
            AuthError::Signatory(e) => AppError::Internal(e.to_string()),
            AuthError::Password(msg) | AuthError::Invariant(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotFound => AppError::NotFound,
            AccessError::Forbidden => AppError::Forbidden,
            AccessError::Store(e) => AppError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_map_to_client_messages() {
        let err = AppError::from(StoreError::Conflict {
            constraint: USERS_EMAIL_KEY.into(),
        });
        assert!(
            matches!(err, AppError::Conflict(ref m) if m == "Email is already in use by another user")
        );
    }

    #[test]
    fn database_failures_hide_their_cause() {
        let err = AppError::from(AuthError::Store(StoreError::Database(
            sqlx::Error::PoolTimedOut,
        )));
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn access_errors_keep_forbidden_and_not_found_apart() {
        assert_eq!(
            AppError::from(AccessError::Forbidden).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(AccessError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
