//! Webhook receivers: payment-provider events and content-lake
//! `service` document changes.
//!
//! Signature verification happens against the raw body before anything
//! else; a bad signature returns 400 and no provider call or document
//! mutation is attempted. Every handled-or-skipped event acks with
//! `{ "received": true }` so the sender only redelivers on genuine
//! processing failures.

use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::handlers::constant_time_eq;
use crate::services::catalogue::{ServiceSnapshot, ServiceSyncOutcome};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const CONTENT_SIGNATURE_HEADER: &str = "Sanity-Webhook-Signature";

/// Checks a `t=<ts>,v1=<hex>` signature header: HMAC-SHA256 of
/// `"<ts>.<body>"` under the endpoint secret, with the timestamp inside
/// the replay tolerance.
pub fn verify_signature(
    headers: &HeaderMap,
    header_name: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let Some(header) = headers.get(header_name).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    let mut timestamp = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if timestamp.is_empty() || v1.is_empty() {
        return false;
    }

    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, v1)
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    summary = "Payment provider webhook",
    description = "Receives signed provider events: checkout completions, price creation, subscription lifecycle",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    if !verify_signature(
        &headers,
        SIGNATURE_HEADER,
        &body,
        &state.config.stripe_webhook_secret,
        state.config.webhook_tolerance_secs,
    ) {
        warn!("webhook signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;
    let event_type = event["type"].as_str().unwrap_or_default();
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, object).await?;
        }
        "price.created" => {
            let price_id = object["id"].as_str().unwrap_or_default();
            let product_id = object["product"].as_str().unwrap_or_default();
            if price_id.is_empty() || product_id.is_empty() {
                warn!("price.created event missing price or product id, skipping");
            } else {
                state.catalogue().sync_price(price_id, product_id).await?;
            }
        }
        "customer.subscription.updated" => {
            let status = object["status"].as_str().unwrap_or_default();
            let at_period_end = object["cancel_at_period_end"].as_bool().unwrap_or(false);
            if status == "canceled" || at_period_end {
                let subscription_id = object["id"].as_str().unwrap_or_default();
                state
                    .reconciler()
                    .cancel_order_for_subscription(subscription_id)
                    .await?;
            }
        }
        "customer.subscription.deleted" => {
            let subscription_id = object["id"].as_str().unwrap_or_default();
            state
                .reconciler()
                .cancel_order_for_subscription(subscription_id)
                .await?;
        }
        other => {
            info!(event_type = %other, "unhandled webhook event type");
        }
    }

    Ok(Json(json!({ "received": true })))
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/content",
    summary = "Content lake webhook",
    description = "Receives signed service-document changes and mirrors recurring services into the provider catalogue",
    request_body = String,
    responses(
        (status = 200, description = "Document acknowledged"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn content_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    if !verify_signature(
        &headers,
        CONTENT_SIGNATURE_HEADER,
        &body,
        &state.config.sanity_webhook_secret,
        state.config.webhook_tolerance_secs,
    ) {
        warn!("content webhook signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }

    let document: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;
    if document["_type"] != json!("service")
        || document["_id"].as_str().unwrap_or_default().is_empty()
    {
        info!("content webhook for a non-service document, skipping");
        return Ok(Json(json!({ "received": true })));
    }

    let snapshot: ServiceSnapshot = serde_json::from_value(document)
        .map_err(|e| ServiceError::BadRequest(format!("invalid service document: {e}")))?;

    match state.catalogue().sync_service(snapshot).await? {
        ServiceSyncOutcome::Synced { product_id, .. } => {
            Ok(Json(json!({ "received": true, "productId": product_id })))
        }
        _ => Ok(Json(json!({ "received": true }))),
    }
}

/// Sends the order-confirmation email for a finished checkout session.
/// Confirmation metadata lives on the SetupIntent for setup-mode
/// sessions and on the Subscription for subscription-mode ones; when
/// it is incomplete the event is acked without an email.
async fn handle_checkout_completed(state: &AppState, object: &Value) -> Result<(), ServiceError> {
    let mode = object["mode"].as_str().unwrap_or_default();
    match mode {
        "setup" => {
            let Some(setup_intent_id) = object["setup_intent"].as_str() else {
                warn!("setup-mode session without setup_intent, skipping confirmation");
                return Ok(());
            };
            let setup_intent = state.payments.retrieve_setup_intent(setup_intent_id).await?;
            let meta = &setup_intent.metadata;
            match (
                meta.get("orderId"),
                meta.get("customerEmail"),
                meta.get("customerName"),
                meta.get("serviceName"),
            ) {
                (Some(order_id), Some(email), Some(name), Some(service_name)) => {
                    state
                        .reconciler()
                        .send_order_confirmation(email, name, order_id, service_name)
                        .await;
                }
                _ => {
                    warn!(setup_intent_id = %setup_intent_id, "incomplete confirmation metadata, skipping email");
                }
            }
        }
        "subscription" => {
            let Some(subscription_id) = object["subscription"].as_str() else {
                warn!("subscription-mode session without subscription, skipping confirmation");
                return Ok(());
            };
            let subscription = state.payments.retrieve_subscription(subscription_id).await?;
            let email = object["customer_details"]["email"].as_str();
            let name = object["customer_details"]["name"].as_str();
            match (
                subscription.metadata.get("orderId"),
                subscription.metadata.get("serviceName"),
                email,
            ) {
                (Some(order_id), Some(service_name), Some(email)) => {
                    state
                        .reconciler()
                        .send_order_confirmation(
                            email,
                            name.unwrap_or("Valued Customer"),
                            order_id,
                            service_name,
                        )
                        .await;
                }
                _ => {
                    warn!(subscription_id = %subscription_id, "incomplete confirmation metadata, skipping email");
                }
            }
        }
        other => {
            info!(mode = %other, "checkout completion in unhandled mode");
        }
    }
    Ok(())
}
