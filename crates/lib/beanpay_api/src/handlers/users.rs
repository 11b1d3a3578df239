//! Account handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use beanpay_core::models::auth::User;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::RegisterRequest;
use crate::services::cookies::clear_refresh_cookie;
use crate::services::validation::ValidatedJson;

/// `POST /users`: create an account.
pub async fn register_handler(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> AppResult<Json<User>> {
    let user = state
        .authenticator
        .register(&body.email, &body.password)
        .await?;
    Ok(Json(user))
}

/// `DELETE /users/me`: delete the caller with their bills, payments and sessions.
pub async fn delete_me_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, StatusCode)> {
    state.authenticator.close_account(user.user_id).await?;
    Ok((
        jar.add(clear_refresh_cookie(state.config.cookie_secure)),
        StatusCode::OK,
    ))
}
