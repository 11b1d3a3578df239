//! Refresh-token cookie.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use time::{Duration, OffsetDateTime};

/// Cookie carrying the current refresh token id.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Build the httpOnly, same-site-strict refresh cookie expiring at `expires_at`.
pub fn refresh_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .expires(OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).ok())
        .build()
}

/// Build an expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_is_locked_down() {
        let expires_at = Utc::now() + chrono::Duration::days(90);
        let cookie = refresh_cookie("abc", expires_at, true);
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.expires_datetime().map(|t| t.unix_timestamp()),
            Some(expires_at.timestamp())
        );
    }

    #[test]
    fn cleared_cookie_has_no_value() {
        let cookie = clear_refresh_cookie(false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
