//! Login and refresh handlers.

use axum::Json;
use axum::extract::State;
use axum_extra::extract::CookieJar;
use beanpay_core::auth::IssuedTokens;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{LoginRequest, TokenResponse};
use crate::services::cookies::{REFRESH_COOKIE, refresh_cookie};
use crate::services::validation::ValidatedJson;

/// Access token in the body, refresh token id in the cookie.
fn respond(state: &AppState, jar: CookieJar, tokens: IssuedTokens) -> (CookieJar, Json<TokenResponse>) {
    let cookie = refresh_cookie(
        &tokens.refresh_token.id.to_string(),
        tokens.refresh_token_expiration,
        state.config.cookie_secure,
    );
    let body = TokenResponse {
        access_token: tokens.access_token,
        access_token_expiration: tokens.access_token_expiration,
    };
    (jar.add(cookie), Json(body))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let tokens = state.authenticator.login(&body.email, &body.password).await?;
    Ok(respond(&state, jar, tokens))
}

/// `POST /auth/refresh`: exchange the refresh cookie for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;
    let tokens = state.authenticator.refresh(&presented).await?;
    Ok(respond(&state, jar, tokens))
}
