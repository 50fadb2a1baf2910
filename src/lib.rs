//! storefront-api: order and payment reconciliation service for a
//! services storefront.
//!
//! The HTTP surface covers buyer checkout (manual-capture one-off
//! payments and provider-hosted subscription checkouts), the admin
//! actions invoked from the content studio, the provider webhook
//! receiver, and intake forms (briefs, quotes, contact). All external
//! collaborators sit behind traits ([`clients::payment::PaymentProvider`],
//! [`clients::content::ContentStore`], [`notifications::Mailer`]) so the
//! whole router can be exercised against in-memory doubles.

pub mod clients;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod testing;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::clients::content::ContentStore;
use crate::clients::payment::PaymentProvider;
use crate::config::AppConfig;
use crate::notifications::Mailer;
use crate::services::briefs::BriefService;
use crate::services::catalogue::CatalogueService;
use crate::services::quotes::QuoteService;
use crate::services::reconciler::OrderReconciler;

/// Shared application state: configuration plus the three collaborator
/// seams. Services are built per request from these handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub payments: Arc<dyn PaymentProvider>,
    pub store: Arc<dyn ContentStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        payments: Arc<dyn PaymentProvider>,
        store: Arc<dyn ContentStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            payments,
            store,
            mailer,
        }
    }

    pub fn reconciler(&self) -> OrderReconciler {
        OrderReconciler::new(
            self.payments.clone(),
            self.store.clone(),
            self.mailer.clone(),
        )
    }

    pub fn quotes(&self) -> QuoteService {
        QuoteService::new(
            self.payments.clone(),
            self.store.clone(),
            self.mailer.clone(),
            self.config.site_url.clone(),
            self.config.default_currency.clone(),
            self.config.notify_email.clone(),
        )
    }

    pub fn briefs(&self) -> BriefService {
        BriefService::new(self.store.clone())
    }

    pub fn catalogue(&self) -> CatalogueService {
        CatalogueService::new(
            self.payments.clone(),
            self.store.clone(),
            self.config.default_currency.clone(),
        )
    }
}

/// Standard success envelope for the operational endpoints.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Buyer-facing checkout
        .route("/checkout/authorize", post(handlers::checkout::authorize))
        .route("/checkout/orders", post(handlers::checkout::create_order))
        .route("/checkout/sessions", post(handlers::checkout::create_session))
        .route(
            "/checkout/subscriptions/complete",
            post(handlers::checkout::complete_subscription),
        )
        // Admin actions
        .route("/admin/capture", post(handlers::admin::capture))
        .route(
            "/admin/cancel-payment-intent",
            post(handlers::admin::cancel_payment_intent),
        )
        .route(
            "/admin/cancel-subscription",
            post(handlers::admin::cancel_subscription),
        )
        .route("/admin/quote-checkout", post(handlers::admin::quote_checkout))
        // Webhooks
        .route("/webhooks/payments", post(handlers::webhooks::payment_webhook))
        .route("/webhooks/content", post(handlers::webhooks::content_webhook))
        // Intake & leads
        .route("/briefs", post(handlers::intake::submit_brief))
        .route("/quotes", post(handlers::intake::submit_quote))
        .route("/contact", post(handlers::intake::contact))
        // Operational
        .route("/status", get(status_check))
        .route("/health", get(health_check))
}

/// Builds the complete application router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
}

async fn status_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    // Collaborators are remote HTTPS APIs reached lazily per request;
    // startup already refused to boot without their credentials, so
    // health reports the process and the configured integrations.
    Json(ApiResponse::success(json!({
        "status": "healthy",
        "environment": state.config.environment,
        "checks": {
            "payment_provider": "configured",
            "content_store": "configured",
            "mailer": "configured",
        },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_envelope_carries_data() {
        let response = ApiResponse::success(json!({"ok": true}));
        assert!(response.success);
        assert_eq!(response.data, Some(json!({"ok": true})));
        assert!(response.message.is_none());
    }

    #[test]
    fn error_envelope_carries_message() {
        let response: ApiResponse<Value> = ApiResponse::error("boom".to_string());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("boom"));
    }
}
