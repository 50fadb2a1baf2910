//! The Order Reconciler.
//!
//! Five independent entry points (authorize, create-order, capture,
//! cancel, subscription-checkout completion) plus the webhook-driven
//! subscription cancellation all converge on one `order` document's
//! status field. There is no in-process coordination: every invocation
//! reads the document fresh, performs at most one provider call, and
//! patches the status once. Idempotency comes from the provider's
//! typed already-in-terminal-state errors being treated as success and
//! from dedup-by-provider-reference before any order is created.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::clients::content::{fetch_one, ContentStore, DocumentPatch};
use crate::clients::payment::{PaymentProvider, ProviderErrorKind};
use crate::errors::ServiceError;
use crate::models::order::{
    OneOffStatus, SubscriptionStatus, BRIEF_NOT_APPLICABLE, BRIEF_NOT_APPLICABLE_SUBSCRIPTION,
    BRIEF_PENDING,
};
use crate::models::{BriefForm, ServiceDoc};
use crate::notifications::{dispatch, templates, Mailer};

pub const ORDER_BY_PAYMENT_INTENT_QUERY: &str =
    r#"*[_type == "order" && stripePaymentIntentId == $paymentIntentId][0]{_id}"#;
pub const ORDER_BY_SUBSCRIPTION_QUERY: &str = r#"*[_type == "order" && stripeSubscriptionId == $subscriptionId][0]{_id, subscriptionStatus, "briefForm": service->projectBrief->{title, fields}}"#;
pub const ORDER_CONTACT_QUERY: &str = r#"*[_type == "order" && _id == $orderId][0]{customerEmail, customerName, oneOffStatus, "serviceName": service->title}"#;
pub const SERVICE_BY_ID_QUERY: &str = r#"*[_type == "service" && _id == $serviceId][0]{_id, title, "slug": slug.current, stripePriceId, "projectBrief": projectBrief->{title, fields}}"#;
pub const SERVICE_BY_SLUG_QUERY: &str = r#"*[_type == "service" && slug.current == $slug][0]{_id, title, "slug": slug.current, stripePriceId, "projectBrief": projectBrief->{title, fields}}"#;

/// Studio actions sometimes hand us a draft document id.
pub fn strip_draft_prefix(id: &str) -> &str {
    id.strip_prefix("drafts.").unwrap_or(id)
}

#[derive(Debug, Clone)]
pub struct AuthorizeOutcome {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateOrderOutcome {
    pub order_id: String,
    /// True when the dedup guard found an existing order for the intent.
    pub existing: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub status: OneOffStatus,
    /// True when the provider reported the funds as already captured and
    /// the local status was merely re-synced.
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub status: OneOffStatus,
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub struct SubscriptionOrderOutcome {
    pub order_id: String,
    pub existing: bool,
    pub brief_form: Option<BriefForm>,
}

/// Result of the webhook-driven subscription cancellation patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionCancelOutcome {
    Cancelled,
    AlreadyCancelled,
    OrderNotFound,
}

#[derive(Debug, Deserialize)]
struct OrderIdRow {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrderSubscriptionRow {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, rename = "subscriptionStatus")]
    subscription_status: Option<SubscriptionStatus>,
    #[serde(default, rename = "briefForm")]
    brief_form: Option<BriefForm>,
}

#[derive(Debug, Deserialize)]
struct OrderContactRow {
    #[serde(default, rename = "customerEmail")]
    customer_email: Option<String>,
    #[serde(default, rename = "customerName")]
    customer_name: Option<String>,
    #[serde(default, rename = "oneOffStatus")]
    one_off_status: Option<OneOffStatus>,
    #[serde(default, rename = "serviceName")]
    service_name: Option<String>,
}

/// Gatekeeper for every one-off status patch: an order already at the
/// target status needs no patch, and a transition the status machine
/// forbids is rejected before any provider call. An unknown current
/// status (fetch failed) falls through to the patch; the provider's
/// own conflict handling still applies.
fn guard_one_off_transition(
    order_id: &str,
    current: Option<OneOffStatus>,
    next: OneOffStatus,
) -> Result<bool, ServiceError> {
    match current {
        Some(cur) if cur == next => Ok(false),
        Some(cur) if !cur.can_transition_to(next) => Err(ServiceError::InvalidStatus(format!(
            "order {order_id} is {cur} and cannot move to {next}"
        ))),
        _ => Ok(true),
    }
}

#[derive(Clone)]
pub struct OrderReconciler {
    payments: Arc<dyn PaymentProvider>,
    store: Arc<dyn ContentStore>,
    mailer: Arc<dyn Mailer>,
}

impl OrderReconciler {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        store: Arc<dyn ContentStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            payments,
            store,
            mailer,
        }
    }

    /// Phase 1 of a one-off purchase: resolve the provider customer and
    /// open a manual-capture hold. No order document exists yet.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn authorize(
        &self,
        amount_minor: i64,
        currency: &str,
        email: &str,
        name: &str,
    ) -> Result<AuthorizeOutcome, ServiceError> {
        let customer = match self.payments.find_customer_by_email(email).await? {
            Some(existing) => {
                if existing.name.as_deref() != Some(name) {
                    self.payments
                        .update_customer_name(&existing.id, name)
                        .await?
                } else {
                    existing
                }
            }
            None => self.payments.create_customer(email, name).await?,
        };

        let intent = self
            .payments
            .create_manual_capture_intent(amount_minor, currency, &customer.id)
            .await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::PaymentProvider("payment intent carried no client secret".into())
        })?;

        info!(intent_id = %intent.id, customer_id = %customer.id, "authorized manual-capture intent");
        Ok(AuthorizeOutcome {
            client_secret,
            payment_intent_id: intent.id,
        })
    }

    /// Phase 2 of a one-off purchase: commit the order document.
    ///
    /// Deduplicated by payment-intent reference, so a client retry after
    /// a dropped response returns the already-created order.
    #[instrument(skip(self))]
    pub async fn create_order(
        &self,
        payment_intent_id: &str,
        service_id: &str,
    ) -> Result<CreateOrderOutcome, ServiceError> {
        let existing: Option<OrderIdRow> = fetch_one(
            self.store.as_ref(),
            ORDER_BY_PAYMENT_INTENT_QUERY,
            &[("paymentIntentId", json!(payment_intent_id))],
        )
        .await?;
        if let Some(order) = existing {
            info!(order_id = %order.id, "order already exists for payment intent");
            return Ok(CreateOrderOutcome {
                order_id: order.id,
                existing: true,
            });
        }

        let intent = self.payments.retrieve_payment_intent(payment_intent_id).await?;
        let customer_id = intent.customer.ok_or_else(|| {
            ServiceError::BadRequest("payment intent is not associated with a customer".into())
        })?;
        let customer = self.payments.retrieve_customer(&customer_id).await?;

        let service: Option<ServiceDoc> = fetch_one(
            self.store.as_ref(),
            SERVICE_BY_ID_QUERY,
            &[("serviceId", json!(service_id))],
        )
        .await?;
        let service = service
            .ok_or_else(|| ServiceError::NotFound(format!("service {service_id} not found")))?;

        let brief = if service.project_brief.is_some() {
            BRIEF_PENDING
        } else {
            BRIEF_NOT_APPLICABLE
        };

        let doc = json!({
            "_type": "order",
            "service": { "_type": "reference", "_ref": service.id },
            "stripePaymentIntentId": payment_intent_id,
            "stripeCustomerId": customer.id,
            "oneOffStatus": OneOffStatus::New,
            "customerName": customer.name.as_deref().unwrap_or("N/A"),
            "customerEmail": customer.email.as_deref().unwrap_or("N/A"),
            "projectBrief": brief,
        });
        let order_id = self.store.create(doc).await?;

        info!(order_id = %order_id, service = %service.title, "created one-off order");
        Ok(CreateOrderOutcome {
            order_id,
            existing: false,
        })
    }

    /// Phase 3 of a one-off purchase: commit the held funds.
    ///
    /// The provider is the source of truth: an already-captured report is
    /// recovery, not failure, and still re-syncs the local status. The
    /// confirmation email goes out on a fresh capture only, keeping
    /// delivery at-most-once.
    #[instrument(skip(self))]
    pub async fn capture(
        &self,
        order_id: &str,
        payment_intent_id: &str,
    ) -> Result<CaptureOutcome, ServiceError> {
        let order_id = strip_draft_prefix(order_id);

        // Read the order snapshot up front; a failure here only costs
        // the email and the transition guard, never the capture.
        let contact: Option<OrderContactRow> = match fetch_one(
            self.store.as_ref(),
            ORDER_CONTACT_QUERY,
            &[("orderId", json!(order_id))],
        )
        .await
        {
            Ok(row) => row,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "failed to fetch order for notification");
                None
            }
        };

        let needs_patch = guard_one_off_transition(
            order_id,
            contact.as_ref().and_then(|c| c.one_off_status),
            OneOffStatus::Paid,
        )?;

        let recovered = match self.payments.capture_payment_intent(payment_intent_id).await {
            Ok(_) => false,
            Err(err) if err.kind == ProviderErrorKind::AlreadyCaptured => {
                info!(intent_id = %payment_intent_id, "intent already captured, re-syncing status");
                true
            }
            Err(err) => return Err(err.into()),
        };

        if needs_patch {
            self.store
                .patch(DocumentPatch::new(order_id).set("oneOffStatus", json!(OneOffStatus::Paid)))
                .await?;
        }

        if !recovered {
            if let Some(contact) = contact.as_ref().filter(|c| c.customer_email.is_some()) {
                let email = contact.customer_email.as_deref().unwrap_or_default();
                let message = templates::payment_confirmation(
                    email,
                    contact.customer_name.as_deref().unwrap_or("Valued Customer"),
                    order_id,
                    contact.service_name.as_deref().unwrap_or("your order"),
                );
                dispatch(self.mailer.as_ref(), message).await;
            } else {
                warn!(order_id = %order_id, "no customer email on order, skipping confirmation");
            }
        }

        info!(order_id = %order_id, recovered, "order captured and marked paid");
        Ok(CaptureOutcome {
            status: OneOffStatus::Paid,
            recovered,
        })
    }

    /// Releases a one-off hold. An already-cancelled report from the
    /// provider still re-syncs the local status.
    #[instrument(skip(self))]
    pub async fn cancel_payment_intent(
        &self,
        order_id: &str,
        payment_intent_id: &str,
    ) -> Result<CancelOutcome, ServiceError> {
        let order_id = strip_draft_prefix(order_id);

        let current: Option<OrderContactRow> = match fetch_one(
            self.store.as_ref(),
            ORDER_CONTACT_QUERY,
            &[("orderId", json!(order_id))],
        )
        .await
        {
            Ok(row) => row,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "failed to fetch order before cancellation");
                None
            }
        };
        let needs_patch = guard_one_off_transition(
            order_id,
            current.and_then(|c| c.one_off_status),
            OneOffStatus::Cancelled,
        )?;

        let recovered = match self.payments.cancel_payment_intent(payment_intent_id).await {
            Ok(_) => false,
            Err(err) if err.kind == ProviderErrorKind::AlreadyCancelled => {
                info!(intent_id = %payment_intent_id, "intent already cancelled, re-syncing status");
                true
            }
            Err(err) => return Err(err.into()),
        };

        if needs_patch {
            self.store
                .patch(
                    DocumentPatch::new(order_id)
                        .set("oneOffStatus", json!(OneOffStatus::Cancelled)),
                )
                .await?;
        }

        info!(order_id = %order_id, recovered, "order cancelled");
        Ok(CancelOutcome {
            status: OneOffStatus::Cancelled,
            recovered,
        })
    }

    /// Cancels a subscription at the provider WITHOUT touching the order
    /// document. The provider fires `customer.subscription.deleted`, and
    /// the webhook handler is the single writer for `subscriptionStatus`;
    /// patching here as well would race that delivery.
    #[instrument(skip(self))]
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ServiceError> {
        match self.payments.cancel_subscription(subscription_id).await {
            Ok(_) => {}
            Err(err) if err.kind == ProviderErrorKind::AlreadyCancelled => {
                info!(subscription_id = %subscription_id, "subscription already cancelled at provider");
            }
            Err(err) => return Err(err.into()),
        }
        info!(subscription_id = %subscription_id, "subscription cancelled at provider");
        Ok(())
    }

    /// Buyer-initiated completion of a subscription checkout. Safe to
    /// call repeatedly with the same session (page refresh): the order
    /// is deduplicated by subscription reference.
    #[instrument(skip(self))]
    pub async fn complete_subscription_checkout(
        &self,
        session_id: &str,
        service_slug: &str,
    ) -> Result<SubscriptionOrderOutcome, ServiceError> {
        let session = self.payments.retrieve_checkout_session(session_id).await?;
        let subscription_id = session.subscription.clone().ok_or_else(|| {
            ServiceError::PaymentProvider("could not retrieve complete session details".into())
        })?;
        let customer_id = session.customer.clone().ok_or_else(|| {
            ServiceError::PaymentProvider("could not retrieve complete session details".into())
        })?;
        let details = session.customer_details.clone().ok_or_else(|| {
            ServiceError::PaymentProvider("could not retrieve complete session details".into())
        })?;

        let existing: Option<OrderSubscriptionRow> = fetch_one(
            self.store.as_ref(),
            ORDER_BY_SUBSCRIPTION_QUERY,
            &[("subscriptionId", json!(subscription_id))],
        )
        .await?;
        if let Some(order) = existing {
            info!(order_id = %order.id, "found existing order for subscription");
            return Ok(SubscriptionOrderOutcome {
                order_id: order.id,
                existing: true,
                brief_form: order.brief_form,
            });
        }

        let service: Option<ServiceDoc> = fetch_one(
            self.store.as_ref(),
            SERVICE_BY_SLUG_QUERY,
            &[("slug", json!(service_slug))],
        )
        .await?;
        let service = service.ok_or_else(|| {
            ServiceError::NotFound(format!("service with slug {service_slug} not found"))
        })?;

        let brief = if service.project_brief.is_some() {
            BRIEF_PENDING
        } else {
            BRIEF_NOT_APPLICABLE_SUBSCRIPTION
        };

        let doc = json!({
            "_type": "order",
            "service": { "_type": "reference", "_ref": service.id },
            "stripeSubscriptionId": subscription_id,
            "stripeCustomerId": customer_id,
            "subscriptionStatus": SubscriptionStatus::InProgress,
            "customerName": details.name.as_deref().unwrap_or("N/A"),
            "customerEmail": details.email.as_deref().unwrap_or("N/A"),
            "projectBrief": brief,
        });
        let order_id = self.store.create(doc).await?;

        info!(order_id = %order_id, subscription_id = %subscription_id, "created subscription order");
        Ok(SubscriptionOrderOutcome {
            order_id,
            existing: false,
            brief_form: service.project_brief,
        })
    }

    /// Webhook-driven subscription cancellation: the single writer for
    /// `subscriptionStatus`. A missing order is a warning, not an error;
    /// the provider must not redeliver for it.
    #[instrument(skip(self))]
    pub async fn cancel_order_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionCancelOutcome, ServiceError> {
        let order: Option<OrderSubscriptionRow> = fetch_one(
            self.store.as_ref(),
            ORDER_BY_SUBSCRIPTION_QUERY,
            &[("subscriptionId", json!(subscription_id))],
        )
        .await?;

        let Some(order) = order else {
            warn!(subscription_id = %subscription_id, "no order found for subscription, cannot cancel");
            return Ok(SubscriptionCancelOutcome::OrderNotFound);
        };

        if order.subscription_status == Some(SubscriptionStatus::Cancelled) {
            info!(order_id = %order.id, "order already cancelled, skipping");
            return Ok(SubscriptionCancelOutcome::AlreadyCancelled);
        }

        self.store
            .patch(
                DocumentPatch::new(order.id.clone())
                    .set("subscriptionStatus", json!(SubscriptionStatus::Cancelled)),
            )
            .await?;

        info!(order_id = %order.id, subscription_id = %subscription_id, "cancelled subscription order");
        Ok(SubscriptionCancelOutcome::Cancelled)
    }

    /// Order-confirmation email for a completed checkout, fired from the
    /// webhook handler.
    pub async fn send_order_confirmation(
        &self,
        email: &str,
        name: &str,
        order_id: &str,
        service_name: &str,
    ) {
        let message = templates::order_confirmation(email, name, order_id, service_name);
        dispatch(self.mailer.as_ref(), message).await;
    }
}
