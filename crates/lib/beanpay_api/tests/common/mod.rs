//! Shared harness: the full router over an in-memory store and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use beanpay_api::config::ApiConfig;
use beanpay_api::{AppState, router};
use beanpay_core::auth::TokenLifetimes;
use beanpay_core::clock::ManualClock;
use beanpay_core::store::MemoryStore;
use serde_json::Value;
use tower::ServiceExt;

pub const SIGNING_KEY: &str = "integration-test-signing-key";
pub const PASSWORD: &str = "some-great-password";

pub struct TestApp {
    pub app: Router,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    /// Value of the `refresh_token` cookie set by this response, if any.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix("refresh_token="))
            .map(|v| v.split(';').next().unwrap_or_default().to_string())
    }

    pub fn set_cookie_header(&self) -> String {
        self.headers
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

pub fn test_config() -> ApiConfig {
    let lifetimes = TokenLifetimes::default();
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: "postgres://unused".into(),
        jwt_signing_key: SIGNING_KEY.into(),
        app_url: "http://localhost:3000".into(),
        bcrypt_cost: 4,
        cookie_secure: true,
        access_token_ttl: lifetimes.access,
        refresh_token_ttl: lifetimes.refresh,
    }
}

pub fn test_app() -> TestApp {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let state = AppState::new(store.clone(), clock.clone(), test_config());
    TestApp {
        app: router(state),
        clock,
        store,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Reply {
        let resp = self.app.clone().oneshot(request).await.expect("request");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> Reply {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn empty(&self, method: Method, uri: &str, token: Option<&str>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Reply {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/refresh")
            .header(COOKIE, format!("refresh_token={refresh_token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn register(&self, email: &str) -> Reply {
        self.json(
            Method::POST,
            "/users",
            None,
            serde_json::json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    pub async fn login(&self, email: &str) -> Reply {
        self.json(
            Method::POST,
            "/auth/login",
            None,
            serde_json::json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    /// Register and log in; returns (access token, refresh token id).
    pub async fn sign_up(&self, email: &str) -> (String, String) {
        assert_eq!(self.register(email).await.status, StatusCode::OK);
        let reply = self.login(email).await;
        assert_eq!(reply.status, StatusCode::OK);
        let access = reply.body["access_token"]
            .as_str()
            .expect("access_token")
            .to_string();
        let refresh = reply.refresh_cookie().expect("refresh cookie");
        (access, refresh)
    }

    /// Create a bill for the owner of `token`; returns its id.
    pub async fn create_bill(&self, token: &str, name: &str) -> String {
        let reply = self
            .json(
                Method::POST,
                "/bills",
                Some(token),
                serde_json::json!({
                    "name": name,
                    "payment_url": "https://pay.example.com",
                    "frequency": "monthly",
                    "estimated_total_due": 120.5,
                    "first_due_date": "2024-01-15",
                }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        reply.body["id"].as_str().expect("bill id").to_string()
    }
}
