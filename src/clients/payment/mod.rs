//! Payment provider abstraction.
//!
//! Every money-moving operation in the service goes through the
//! [`PaymentProvider`] trait; the Stripe-backed implementation lives in
//! [`stripe`]. Handlers never see raw provider wire errors: the client
//! classifies them into [`ProviderErrorKind`] so callers can branch on
//! stable variants (notably the already-in-terminal-state recoveries)
//! instead of matching message text.

pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use stripe::StripeClient;

/// Stable classification of provider failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Capture requested for an intent the provider already captured.
    AlreadyCaptured,
    /// Cancellation requested for an intent/subscription already cancelled.
    AlreadyCancelled,
    /// The referenced object does not exist at the provider.
    ResourceMissing,
    /// Any other provider-reported API error.
    Api,
    /// Transport-level failure before a provider response was obtained.
    Network,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Api, message)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub setup_intent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetupIntent {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Price {
    pub id: String,
    pub product: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
}

/// Parameters for the admin quote-payment checkout session.
#[derive(Debug, Clone)]
pub struct QuoteCheckoutParams {
    pub customer_id: String,
    pub currency: String,
    pub product_name: String,
    pub description: String,
    pub amount_minor: i64,
    pub quote_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn find_customer_by_email(&self, email: &str)
        -> Result<Option<Customer>, ProviderError>;
    async fn create_customer(&self, email: &str, name: &str) -> Result<Customer, ProviderError>;
    async fn update_customer_name(&self, id: &str, name: &str)
        -> Result<Customer, ProviderError>;
    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProviderError>;

    async fn create_manual_capture_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        customer_id: &str,
    ) -> Result<PaymentIntent, ProviderError>;
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError>;
    async fn capture_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError>;
    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError>;

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProviderError>;
    async fn cancel_subscription(&self, id: &str) -> Result<Subscription, ProviderError>;

    async fn retrieve_checkout_session(&self, id: &str)
        -> Result<CheckoutSession, ProviderError>;
    async fn create_subscription_checkout(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, ProviderError>;
    async fn create_quote_checkout(
        &self,
        params: QuoteCheckoutParams,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn retrieve_setup_intent(&self, id: &str) -> Result<SetupIntent, ProviderError>;

    async fn retrieve_product(&self, id: &str) -> Result<Product, ProviderError>;
    async fn create_product(
        &self,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError>;
    async fn update_product(
        &self,
        id: &str,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError>;
    async fn retrieve_price(&self, id: &str) -> Result<Price, ProviderError>;
    async fn create_recurring_price(
        &self,
        product_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<Price, ProviderError>;
}
