//! Buyer-facing checkout endpoints.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::BriefForm;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// Amount to hold, in minor currency units
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/authorize",
    summary = "Authorize a one-off payment",
    description = "Resolves the payment-provider customer by email and opens a manual-capture hold",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Hold opened", body = AuthorizeResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn authorize(
    State(state): State<AppState>,
    Json(payload): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ServiceError> {
    payload.validate()?;

    let outcome = state
        .reconciler()
        .authorize(
            payload.amount,
            &state.config.default_currency,
            &payload.email,
            &payload.name,
        )
        .await?;

    Ok(Json(AuthorizeResponse {
        client_secret: outcome.client_secret,
        payment_intent_id: outcome.payment_intent_id,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
    #[validate(length(min = 1))]
    pub service_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders",
    summary = "Create a one-off order",
    description = "Records the order document for an authorized payment; repeat calls return the existing order",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order recorded", body = CreateOrderResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown service or intent", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ServiceError> {
    payload.validate()?;

    let outcome = state
        .reconciler()
        .create_order(&payload.payment_intent_id, &payload.service_id)
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: outcome.order_id,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1))]
    pub price_id: String,
    #[validate(length(min = 1))]
    pub service_slug: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions",
    summary = "Open a subscription checkout",
    description = "Creates a provider-hosted subscription checkout session for a catalogue price",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ServiceError> {
    payload.validate()?;

    let site = &state.config.site_url;
    let slug = &payload.service_slug;
    let success_url =
        format!("{site}/subscription-success?session_id={{CHECKOUT_SESSION_ID}}&service={slug}");
    let cancel_url = format!("{site}/services/{slug}");

    let session = state
        .payments
        .create_subscription_checkout(&payload.price_id, &success_url, &cancel_url)
        .await?;
    let url = session.url.ok_or_else(|| {
        ServiceError::PaymentProvider("checkout session carried no url".into())
    })?;

    Ok(Json(CreateSessionResponse { url }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSubscriptionRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(length(min = 1))]
    pub service_slug: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSubscriptionResponse {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_brief: Option<BriefForm>,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/subscriptions/complete",
    summary = "Complete a subscription checkout",
    description = "Records the order for a finished checkout session; idempotent across page refreshes",
    request_body = CompleteSubscriptionRequest,
    responses(
        (status = 200, description = "Order recorded", body = CompleteSubscriptionResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown service slug", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn complete_subscription(
    State(state): State<AppState>,
    Json(payload): Json<CompleteSubscriptionRequest>,
) -> Result<Json<CompleteSubscriptionResponse>, ServiceError> {
    payload.validate()?;

    let outcome = state
        .reconciler()
        .complete_subscription_checkout(&payload.session_id, &payload.service_slug)
        .await?;

    Ok(Json(CompleteSubscriptionResponse {
        order_id: outcome.order_id,
        project_brief: outcome.brief_form,
    }))
}
