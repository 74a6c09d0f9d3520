#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use latchkey::{
    ServerConfig, create_app,
    db::Database,
    jwt::{SigningContext, TokenCodec},
    notify::{RecordingNotifier, token_from_link},
    password::MIN_BCRYPT_COST,
    rate_limit::RateLimitSettings,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-test-jwt-secret!";
pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub notifier: Arc<RecordingNotifier>,
    pub codec: TokenCodec,
}

/// Generous limits so only the rate limit tests ever hit them.
pub fn relaxed_limits() -> RateLimitSettings {
    RateLimitSettings {
        login_per_minute: 1000,
        register_per_minute: 1000,
        trust_forwarded_for: true,
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_limits(relaxed_limits()).await
}

pub async fn create_test_app_with_limits(rate_limits: RateLimitSettings) -> TestApp {
    let app_url = Url::parse("http://localhost:3000").expect("Invalid URL");
    create_test_app_with(rate_limits, app_url).await
}

pub async fn create_test_app_with(rate_limits: RateLimitSettings, app_url: Url) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let notifier = Arc::new(RecordingNotifier::new());
    let signing = SigningContext::new(TEST_SECRET);
    let config = ServerConfig {
        db: db.clone(),
        signing: signing.clone(),
        bcrypt_cost: MIN_BCRYPT_COST,
        app_url,
        notifier: notifier.clone(),
        rate_limits,
    };
    TestApp {
        app: create_app(&config),
        db,
        notifier,
        codec: TokenCodec::new(&signing),
    }
}

impl TestApp {
    /// POST a JSON body, returning the status and the parsed response body.
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.10")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// GET with an optional bearer token.
    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// POST without a body, with an optional bearer token.
    pub async fn post_empty(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, email: &str) -> StatusCode {
        let (status, _) = self
            .post(
                "/auth/register",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        status
    }

    /// Login and return (access_token, refresh_token).
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    /// Token carried by the last email sent to `email`.
    pub fn mailed_token(&self, email: &str) -> String {
        let message = self.notifier.last_to(email).expect("no email sent");
        token_from_link(&message.html_body)
            .expect("no token in email")
            .to_string()
    }
}
