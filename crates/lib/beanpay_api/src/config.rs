//! API server configuration.

use beanpay_core::auth::TokenLifetimes;
use beanpay_core::auth::jwt::resolve_signing_key;
use beanpay_core::auth::password::DEFAULT_BCRYPT_COST;
use chrono::Duration;
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// HS256 key for access tokens.
    pub jwt_signing_key: String,
    /// Origin allowed by CORS.
    pub app_url: String,
    pub bcrypt_cost: u32,
    /// Whether the refresh cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable          | Default                                |
    /// |-------------------|----------------------------------------|
    /// | `BIND_ADDR`       | `127.0.0.1:8080`                       |
    /// | `POSTGRES_URL`    | `postgres://localhost:5432/beanpay`    |
    /// | `JWT_SIGNING_KEY` | generated & persisted to file          |
    /// | `APP_URL`         | `http://localhost:3000`                |
    /// | `BCRYPT_COST`     | `14`                                   |
    /// | `COOKIE_SECURE`   | `true`                                 |
    pub fn from_env() -> Self {
        let lifetimes = TokenLifetimes::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            database_url: std::env::var("POSTGRES_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/beanpay".into()),
            jwt_signing_key: resolve_signing_key(),
            app_url: std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".into()),
            bcrypt_cost: bcrypt_cost_from_env(),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
            access_token_ttl: lifetimes.access,
            refresh_token_ttl: lifetimes.refresh,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: self.access_token_ttl,
            refresh: self.refresh_token_ttl,
        }
    }
}

fn bcrypt_cost_from_env() -> u32 {
    let Ok(raw) = std::env::var("BCRYPT_COST") else {
        return DEFAULT_BCRYPT_COST;
    };
    match raw.trim().parse::<u32>() {
        Ok(cost) if (4..=31).contains(&cost) => cost,
        _ => {
            warn!(value = %raw, "ignoring invalid BCRYPT_COST");
            DEFAULT_BCRYPT_COST
        }
    }
}
