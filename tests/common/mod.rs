//! Shared harness for the integration suites: a full router over
//! in-memory collaborator doubles, driven with `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;

use storefront_api::config::AppConfig;
use storefront_api::testing::{MockMailer, MockProvider, MockStore};
use storefront_api::AppState;

pub const ADMIN_SECRET: &str = "test-admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const SANITY_WEBHOOK_SECRET: &str = "sanity_whsec_test";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        site_url: "https://storefront.test".to_string(),
        stripe_secret_key: "sk_test_key".to_string(),
        stripe_webhook_secret: WEBHOOK_SECRET.to_string(),
        webhook_tolerance_secs: 300,
        admin_api_secret: ADMIN_SECRET.to_string(),
        sanity_project_id: "test-project".to_string(),
        sanity_dataset: "production".to_string(),
        sanity_api_version: "2021-10-21".to_string(),
        sanity_token: "sanity-test-token".to_string(),
        sanity_webhook_secret: SANITY_WEBHOOK_SECRET.to_string(),
        resend_api_key: "re_test_key".to_string(),
        resend_from_email: "orders@storefront.test".to_string(),
        notify_email: "owner@storefront.test".to_string(),
        default_currency: "gbp".to_string(),
        cors_allowed_origins: None,
        cors_allow_any_origin: true,
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<MockProvider>,
    pub store: Arc<MockStore>,
    pub mailer: Arc<MockMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MockStore::new());
        let mailer = Arc::new(MockMailer::new());
        let state = AppState::new(
            Arc::new(test_config()),
            provider.clone(),
            store.clone(),
            mailer.clone(),
        );
        Self {
            router: storefront_api::app(state),
            provider,
            store,
            mailer,
        }
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json_with_bearer(
        &self,
        path: &str,
        body: Value,
        bearer: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Posts a correctly signed webhook event.
    pub async fn post_webhook(&self, event: Value) -> (StatusCode, Value) {
        let body = event.to_string();
        let signature = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);
        self.post_webhook_raw(&body, &signature).await
    }

    pub async fn post_webhook_raw(&self, body: &str, signature: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/payments")
            .header("Stripe-Signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Posts a correctly signed content-lake webhook document.
    pub async fn post_content_webhook(&self, document: Value) -> (StatusCode, Value) {
        let body = document.to_string();
        let signature = sign_webhook(SANITY_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);
        self.post_content_webhook_raw(&body, &signature).await
    }

    pub async fn post_content_webhook_raw(&self, body: &str, signature: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/content")
            .header("Sanity-Webhook-Signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

pub fn sign_webhook(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
