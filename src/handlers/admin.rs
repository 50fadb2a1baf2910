//! Admin actions, guarded by the shared-secret bearer header.
//!
//! These are invoked from the content-studio document actions, so the
//! response bodies carry the `success`/`status` fields those action
//! dialogs render.

use axum::{extract::State, http::HeaderMap, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::require_admin;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    fn with_status(status: &str) -> Self {
        Self {
            success: true,
            status: Some(status.to_string()),
            message: None,
        }
    }

    fn note(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/capture",
    summary = "Capture held funds",
    description = "Captures the manual-capture hold for an order and marks it paid",
    request_body = CaptureRequest,
    responses(
        (status = 200, description = "Funds captured", body = ActionResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("admin_bearer" = [])),
    tag = "Admin"
)]
pub async fn capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<ActionResponse>, ServiceError> {
    require_admin(&headers, &state.config.admin_api_secret)?;
    payload.validate()?;

    let outcome = state
        .reconciler()
        .capture(&payload.order_id, &payload.payment_intent_id)
        .await?;

    let mut response = ActionResponse::with_status(&outcome.status.to_string());
    if outcome.recovered {
        response = response.note("Payment was already captured; order status re-synced");
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelIntentRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/cancel-payment-intent",
    summary = "Release a payment hold",
    description = "Cancels the manual-capture hold for an order and marks it cancelled",
    request_body = CancelIntentRequest,
    responses(
        (status = 200, description = "Hold released", body = ActionResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("admin_bearer" = [])),
    tag = "Admin"
)]
pub async fn cancel_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CancelIntentRequest>,
) -> Result<Json<ActionResponse>, ServiceError> {
    require_admin(&headers, &state.config.admin_api_secret)?;
    payload.validate()?;

    let outcome = state
        .reconciler()
        .cancel_payment_intent(&payload.order_id, &payload.payment_intent_id)
        .await?;

    let mut response = ActionResponse::with_status(&outcome.status.to_string());
    if outcome.recovered {
        response = response.note("Payment was already cancelled; order status re-synced");
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    #[validate(length(min = 1))]
    pub subscription_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/cancel-subscription",
    summary = "Cancel a subscription",
    description = "Cancels the provider subscription; the order is updated by the webhook delivery",
    request_body = CancelSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription cancelled", body = ActionResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("admin_bearer" = [])),
    tag = "Admin"
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CancelSubscriptionRequest>,
) -> Result<Json<ActionResponse>, ServiceError> {
    require_admin(&headers, &state.config.admin_api_secret)?;
    payload.validate()?;

    state
        .reconciler()
        .cancel_subscription(&payload.subscription_id)
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        status: None,
        message: None,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCheckoutRequest {
    #[validate(length(min = 1))]
    pub quote_id: String,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(range(min = 0.01))]
    pub estimated_price: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteCheckoutResponse {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/quote-checkout",
    summary = "Create a quote payment link",
    description = "Opens a one-off checkout for the estimated amount and attaches the link to the quote",
    request_body = QuoteCheckoutRequest,
    responses(
        (status = 200, description = "Checkout created", body = QuoteCheckoutResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown quote", body = crate::errors::ErrorResponse)
    ),
    security(("admin_bearer" = [])),
    tag = "Admin"
)]
pub async fn quote_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QuoteCheckoutRequest>,
) -> Result<Json<QuoteCheckoutResponse>, ServiceError> {
    require_admin(&headers, &state.config.admin_api_secret)?;
    payload.validate()?;

    let url = state
        .quotes()
        .create_checkout(
            &payload.quote_id,
            &payload.customer_name,
            &payload.customer_email,
            payload.estimated_price,
        )
        .await?;

    Ok(Json(QuoteCheckoutResponse { url }))
}
