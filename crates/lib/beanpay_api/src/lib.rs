//! # beanpay_api
//!
//! HTTP API library for Beanpay.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use beanpay_core::auth::{Authenticator, TokenSignatory};
use beanpay_core::clock::Clock;
use beanpay_core::store::Store;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{auth, bills, payments, ping, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for users, refresh chains, bills and payments.
    pub store: Arc<dyn Store>,
    pub authenticator: Arc<Authenticator>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the authenticator and its signatory to `store` and `clock`.
    pub fn new<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: ApiConfig) -> Self
    where
        S: Store + 'static,
    {
        let signatory = Arc::new(TokenSignatory::new(
            config.jwt_signing_key.as_bytes(),
            clock.clone(),
        ));
        let authenticator = Authenticator::new(store.clone(), store.clone(), signatory, clock)
            .with_lifetimes(config.lifetimes())
            .with_bcrypt_cost(config.bcrypt_cost);
        Self {
            store,
            authenticator: Arc::new(authenticator),
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `beanpay_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    beanpay_core::migrate::migrate(pool).await
}

/// CORS for the browser app at `APP_URL`, with credentials.
fn cors(app_url: &str) -> CorsLayer {
    let origin = match app_url.parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            warn!(app_url, error = %e, "APP_URL is not a valid origin; CORS disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("keep-alive"),
            USER_AGENT,
            CACHE_CONTROL,
            CONTENT_TYPE,
        ])
        .allow_credentials(true)
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public = Router::new()
        .route("/ping", get(ping::ping_handler))
        .route("/users", post(users::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/users/me", delete(users::delete_me_handler))
        .route(
            "/bills",
            get(bills::list_bills_handler).post(bills::create_bill_handler),
        )
        .route(
            "/bills/{id}",
            get(bills::get_bill_handler)
                .put(bills::update_bill_handler)
                .delete(bills::delete_bill_handler),
        )
        .route(
            "/payments",
            get(payments::list_payments_handler).post(payments::create_payment_handler),
        )
        .route("/payments/{id}", delete(payments::delete_payment_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors(&state.config.app_url))
        .with_state(state)
}
