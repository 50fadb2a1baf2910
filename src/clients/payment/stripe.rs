use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{instrument, warn};

use super::{
    CheckoutSession, Customer, PaymentIntent, PaymentProvider, Price, Product, ProviderError,
    ProviderErrorKind, QuoteCheckoutParams, SetupIntent, Subscription,
};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe REST client (form-encoded requests, bearer secret key).
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// Wire shape of a Stripe error response.
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerList {
    data: Vec<Customer>,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            secret_key,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        self.get_query(path, &[]).await
    }

    async fn get_query<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn delete<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| {
                ProviderError::api(format!("unexpected provider response shape: {e}"))
            });
        }

        let (code, message) = match serde_json::from_slice::<StripeErrorBody>(&bytes) {
            Ok(body) => (
                body.error.code,
                body.error
                    .message
                    .unwrap_or_else(|| format!("provider returned {status}")),
            ),
            Err(_) => (None, format!("provider returned {status}")),
        };

        let kind = match code.as_deref() {
            Some("resource_missing") => ProviderErrorKind::ResourceMissing,
            // The authoritative intent state is resolved by the caller;
            // the raw code alone cannot distinguish captured from cancelled.
            _ => ProviderErrorKind::Api,
        };
        Err(ProviderError::new(kind, message))
    }

    fn is_unexpected_state(err: &ProviderError) -> bool {
        // Stripe reports both "already captured" and "already cancelled"
        // under kind Api with code payment_intent_unexpected_state; the
        // message is free text. Rather than parse it, re-read the intent
        // and let its authoritative status decide.
        err.kind == ProviderErrorKind::Api
    }

    /// Re-reads an intent after a state-conflict failure and upgrades the
    /// error to a stable terminal-state kind when the provider already
    /// holds the intent in that state.
    async fn classify_intent_conflict(
        &self,
        id: &str,
        original: ProviderError,
    ) -> ProviderError {
        match self.retrieve_payment_intent(id).await {
            Ok(intent) if intent.status == "succeeded" => {
                ProviderError::new(ProviderErrorKind::AlreadyCaptured, original.message)
            }
            Ok(intent) if intent.status == "canceled" => {
                ProviderError::new(ProviderErrorKind::AlreadyCancelled, original.message)
            }
            Ok(_) => original,
            Err(err) => {
                warn!(intent_id = %id, error = %err, "failed to re-read intent after conflict");
                original
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self))]
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, ProviderError> {
        let list: CustomerList = self
            .get_query("/customers", &[("email", email), ("limit", "1")])
            .await?;
        Ok(list.data.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn create_customer(&self, email: &str, name: &str) -> Result<Customer, ProviderError> {
        self.post_form(
            "/customers",
            &[("email", email.to_string()), ("name", name.to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn update_customer_name(
        &self,
        id: &str,
        name: &str,
    ) -> Result<Customer, ProviderError> {
        self.post_form(&format!("/customers/{id}"), &[("name", name.to_string())])
            .await
    }

    #[instrument(skip(self))]
    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProviderError> {
        self.get(&format!("/customers/{id}")).await
    }

    #[instrument(skip(self))]
    async fn create_manual_capture_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        customer_id: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        self.post_form(
            "/payment_intents",
            &[
                ("amount", amount_minor.to_string()),
                ("currency", currency.to_string()),
                ("customer", customer_id.to_string()),
                ("capture_method", "manual".to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        self.get(&format!("/payment_intents/{id}")).await
    }

    #[instrument(skip(self))]
    async fn capture_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        match self
            .post_form(&format!("/payment_intents/{id}/capture"), &[])
            .await
        {
            Ok(intent) => Ok(intent),
            Err(err) if Self::is_unexpected_state(&err) => {
                Err(self.classify_intent_conflict(id, err).await)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        match self
            .post_form(&format!("/payment_intents/{id}/cancel"), &[])
            .await
        {
            Ok(intent) => Ok(intent),
            Err(err) if Self::is_unexpected_state(&err) => {
                Err(self.classify_intent_conflict(id, err).await)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProviderError> {
        self.get(&format!("/subscriptions/{id}")).await
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, id: &str) -> Result<Subscription, ProviderError> {
        match self.delete(&format!("/subscriptions/{id}")).await {
            Ok(sub) => Ok(sub),
            Err(err) if err.kind == ProviderErrorKind::ResourceMissing => Err(err),
            Err(err) => {
                // A cancel on an already-cancelled subscription surfaces as a
                // generic API error; the subscription's own status settles it.
                match self.retrieve_subscription(id).await {
                    Ok(sub) if sub.status == "canceled" => Err(ProviderError::new(
                        ProviderErrorKind::AlreadyCancelled,
                        err.message,
                    )),
                    _ => Err(err),
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        self.get(&format!("/checkout/sessions/{id}")).await
    }

    #[instrument(skip(self))]
    async fn create_subscription_checkout(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        self.post_form(
            "/checkout/sessions",
            &[
                ("mode", "subscription".to_string()),
                ("payment_method_types[0]", "card".to_string()),
                ("line_items[0][price]", price_id.to_string()),
                ("line_items[0][quantity]", "1".to_string()),
                ("success_url", success_url.to_string()),
                ("cancel_url", cancel_url.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self, params))]
    async fn create_quote_checkout(
        &self,
        params: QuoteCheckoutParams,
    ) -> Result<CheckoutSession, ProviderError> {
        self.post_form(
            "/checkout/sessions",
            &[
                ("mode", "payment".to_string()),
                ("payment_method_types[0]", "card".to_string()),
                ("customer", params.customer_id),
                ("line_items[0][price_data][currency]", params.currency),
                (
                    "line_items[0][price_data][product_data][name]",
                    params.product_name,
                ),
                (
                    "line_items[0][price_data][product_data][description]",
                    params.description,
                ),
                (
                    "line_items[0][price_data][unit_amount]",
                    params.amount_minor.to_string(),
                ),
                ("line_items[0][quantity]", "1".to_string()),
                ("metadata[quoteId]", params.quote_id),
                ("success_url", params.success_url),
                ("cancel_url", params.cancel_url),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_setup_intent(&self, id: &str) -> Result<SetupIntent, ProviderError> {
        self.get(&format!("/setup_intents/{id}")).await
    }

    #[instrument(skip(self))]
    async fn retrieve_product(&self, id: &str) -> Result<Product, ProviderError> {
        self.get(&format!("/products/{id}")).await
    }

    #[instrument(skip(self))]
    async fn create_product(
        &self,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError> {
        self.post_form(
            "/products",
            &[
                ("name", name.to_string()),
                ("metadata[sanity_slug]", catalogue_slug.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn update_product(
        &self,
        id: &str,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError> {
        self.post_form(
            &format!("/products/{id}"),
            &[
                ("name", name.to_string()),
                ("metadata[sanity_slug]", catalogue_slug.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_price(&self, id: &str) -> Result<Price, ProviderError> {
        self.get(&format!("/prices/{id}")).await
    }

    #[instrument(skip(self))]
    async fn create_recurring_price(
        &self,
        product_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<Price, ProviderError> {
        self.post_form(
            "/prices",
            &[
                ("product", product_id.to_string()),
                ("unit_amount", amount_minor.to_string()),
                ("currency", currency.to_string()),
                ("recurring[interval]", "month".to_string()),
            ],
        )
        .await
    }
}
