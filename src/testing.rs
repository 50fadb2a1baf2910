//! In-memory doubles for the provider, document store, and mailer
//! seams, shared by the unit tests across service modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::clients::content::{ContentStore, DocumentPatch, StoreError};
use crate::clients::payment::{
    CheckoutSession, Customer, CustomerDetails, PaymentIntent, PaymentProvider, Price, Product,
    ProviderError, ProviderErrorKind, QuoteCheckoutParams, SetupIntent, Subscription,
};
use crate::notifications::{EmailMessage, Mailer, NotificationError};
use crate::services::quotes::QUOTE_BY_ID_QUERY;
use crate::services::reconciler::{
    ORDER_BY_PAYMENT_INTENT_QUERY, ORDER_BY_SUBSCRIPTION_QUERY, ORDER_CONTACT_QUERY,
    SERVICE_BY_ID_QUERY, SERVICE_BY_SLUG_QUERY,
};

fn param<'a>(params: &'a [(&str, Value)], name: &str) -> &'a Value {
    params
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .unwrap_or(&Value::Null)
}

#[derive(Default)]
struct ProviderState {
    customers: HashMap<String, Customer>,
    intents: HashMap<String, PaymentIntent>,
    subscriptions: HashMap<String, Subscription>,
    sessions: HashMap<String, CheckoutSession>,
    setup_intents: HashMap<String, SetupIntent>,
    products: HashMap<String, Product>,
    prices: HashMap<String, Price>,
    created_prices: Vec<Price>,
    next_capture_failure: Option<ProviderError>,
    quote_checkouts: Vec<QuoteCheckoutParams>,
    subscription_checkouts: Vec<(String, String)>,
}

/// Stateful payment-provider double with the real provider's conflict
/// behavior: capturing a succeeded intent or cancelling a canceled one
/// yields the typed already-terminal error.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<ProviderState>,
    counter: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n}")
    }

    pub fn seed_customer(&self, id: &str, email: &str, name: &str) {
        self.state.lock().unwrap().customers.insert(
            id.to_string(),
            Customer {
                id: id.to_string(),
                email: Some(email.to_string()),
                name: Some(name.to_string()),
            },
        );
    }

    pub fn seed_authorized_intent(&self, customer_id: &str, amount: i64) -> String {
        let id = self.next_id("pi");
        self.state.lock().unwrap().intents.insert(
            id.clone(),
            PaymentIntent {
                id: id.clone(),
                status: "requires_capture".to_string(),
                client_secret: Some(format!("{id}_secret")),
                customer: Some(customer_id.to_string()),
                amount,
            },
        );
        id
    }

    pub fn seed_subscription(&self, status: &str) -> String {
        self.seed_subscription_with_metadata(status, &[])
    }

    pub fn seed_subscription_with_metadata(
        &self,
        status: &str,
        metadata: &[(&str, &str)],
    ) -> String {
        let id = self.next_id("sub");
        self.state.lock().unwrap().subscriptions.insert(
            id.clone(),
            Subscription {
                id: id.clone(),
                status: status.to_string(),
                cancel_at_period_end: false,
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
        id
    }

    pub fn seed_setup_intent(&self, id: &str, metadata: &[(&str, &str)]) {
        self.state.lock().unwrap().setup_intents.insert(
            id.to_string(),
            SetupIntent {
                id: id.to_string(),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    /// Seeds a completed subscription-mode checkout session together with
    /// its subscription, customer, and contact details.
    pub fn seed_subscription_session(&self, email: &str, name: &str) -> (String, String) {
        let sub_id = self.seed_subscription("active");
        let customer_id = self.next_id("cus");
        self.seed_customer(&customer_id, email, name);
        let session_id = self.next_id("cs");
        self.state.lock().unwrap().sessions.insert(
            session_id.clone(),
            CheckoutSession {
                id: session_id.clone(),
                url: None,
                mode: Some("subscription".to_string()),
                subscription: Some(sub_id.clone()),
                customer: Some(customer_id),
                customer_details: Some(CustomerDetails {
                    email: Some(email.to_string()),
                    name: Some(name.to_string()),
                }),
                setup_intent: None,
            },
        );
        (session_id, sub_id)
    }

    pub fn seed_product(&self, id: &str, metadata: &[(&str, &str)]) {
        self.state.lock().unwrap().products.insert(
            id.to_string(),
            Product {
                id: id.to_string(),
                name: None,
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    pub fn seed_price(&self, id: &str, product_id: &str, unit_amount: i64) {
        self.state.lock().unwrap().prices.insert(
            id.to_string(),
            Price {
                id: id.to_string(),
                product: product_id.to_string(),
                unit_amount: Some(unit_amount),
            },
        );
    }

    pub fn fail_next_capture(&self, error: ProviderError) {
        self.state.lock().unwrap().next_capture_failure = Some(error);
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    pub fn customer_name(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .customers
            .get(id)
            .and_then(|c| c.name.clone())
    }

    pub fn subscription_status(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(id)
            .map(|s| s.status.clone())
    }

    pub fn intent_status(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .intents
            .get(id)
            .map(|i| i.status.clone())
    }

    pub fn quote_checkouts(&self) -> Vec<QuoteCheckoutParams> {
        self.state.lock().unwrap().quote_checkouts.clone()
    }

    /// Recorded `(price_id, success_url)` pairs from subscription
    /// checkout creation.
    pub fn subscription_checkouts(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().subscription_checkouts.clone()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.state.lock().unwrap().products.get(id).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.state.lock().unwrap().products.len()
    }

    /// Prices created through the trait, in creation order.
    pub fn created_prices(&self) -> Vec<Price> {
        self.state.lock().unwrap().created_prices.clone()
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ProviderError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .customers
            .values()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_customer(&self, email: &str, name: &str) -> Result<Customer, ProviderError> {
        let id = self.next_id("cus");
        let customer = Customer {
            id: id.clone(),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
        };
        self.state
            .lock()
            .unwrap()
            .customers
            .insert(id, customer.clone());
        Ok(customer)
    }

    async fn update_customer_name(&self, id: &str, name: &str) -> Result<Customer, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let customer = state.customers.get_mut(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::ResourceMissing, "no such customer")
        })?;
        customer.name = Some(name.to_string());
        Ok(customer.clone())
    }

    async fn retrieve_customer(&self, id: &str) -> Result<Customer, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .customers
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ResourceMissing, "no such customer"))
    }

    async fn create_manual_capture_intent(
        &self,
        amount: i64,
        _currency: &str,
        customer_id: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        let id = self.next_id("pi");
        let intent = PaymentIntent {
            id: id.clone(),
            status: "requires_payment_method".to_string(),
            client_secret: Some(format!("{id}_secret")),
            customer: Some(customer_id.to_string()),
            amount,
        };
        self.state.lock().unwrap().intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ResourceMissing, "no such intent"))
    }

    async fn capture_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.next_capture_failure.take() {
            return Err(error);
        }
        let intent = state.intents.get_mut(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::ResourceMissing, "no such intent")
        })?;
        match intent.status.as_str() {
            "succeeded" => Err(ProviderError::new(
                ProviderErrorKind::AlreadyCaptured,
                "intent already captured",
            )),
            "canceled" => Err(ProviderError::new(
                ProviderErrorKind::Api,
                "intent is canceled",
            )),
            _ => {
                intent.status = "succeeded".to_string();
                Ok(intent.clone())
            }
        }
    }

    async fn cancel_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let intent = state.intents.get_mut(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::ResourceMissing, "no such intent")
        })?;
        match intent.status.as_str() {
            "canceled" => Err(ProviderError::new(
                ProviderErrorKind::AlreadyCancelled,
                "intent already canceled",
            )),
            "succeeded" => Err(ProviderError::new(
                ProviderErrorKind::Api,
                "intent already captured",
            )),
            _ => {
                intent.status = "canceled".to_string();
                Ok(intent.clone())
            }
        }
    }

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::ResourceMissing, "no such subscription")
            })
    }

    async fn cancel_subscription(&self, id: &str) -> Result<Subscription, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let subscription = state.subscriptions.get_mut(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::ResourceMissing, "no such subscription")
        })?;
        if subscription.status == "canceled" {
            return Err(ProviderError::new(
                ProviderErrorKind::AlreadyCancelled,
                "subscription already canceled",
            ));
        }
        subscription.status = "canceled".to_string();
        Ok(subscription.clone())
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ResourceMissing, "no such session"))
    }

    async fn create_subscription_checkout(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let _ = cancel_url;
        let id = self.next_id("cs");
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/{id}")),
            mode: Some("subscription".to_string()),
            subscription: None,
            customer: None,
            customer_details: None,
            setup_intent: None,
        };
        self.state
            .lock()
            .unwrap()
            .subscription_checkouts
            .push((price_id.to_string(), success_url.to_string()));
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(id, session.clone());
        Ok(session)
    }

    async fn create_quote_checkout(
        &self,
        params: QuoteCheckoutParams,
    ) -> Result<CheckoutSession, ProviderError> {
        let id = self.next_id("cs");
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/{id}")),
            mode: Some("payment".to_string()),
            subscription: None,
            customer: Some(params.customer_id.clone()),
            customer_details: None,
            setup_intent: None,
        };
        let mut state = self.state.lock().unwrap();
        state.quote_checkouts.push(params);
        state.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_setup_intent(&self, id: &str) -> Result<SetupIntent, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .setup_intents
            .get(id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::ResourceMissing, "no such setup intent")
            })
    }

    async fn retrieve_product(&self, id: &str) -> Result<Product, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ResourceMissing, "no such product"))
    }

    async fn create_product(
        &self,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError> {
        let id = self.next_id("prod");
        let product = Product {
            id: id.clone(),
            name: Some(name.to_string()),
            metadata: [("sanity_slug".to_string(), catalogue_slug.to_string())]
                .into_iter()
                .collect(),
        };
        self.state
            .lock()
            .unwrap()
            .products
            .insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: &str,
        name: &str,
        catalogue_slug: &str,
    ) -> Result<Product, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let product = state.products.get_mut(id).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::ResourceMissing, "no such product")
        })?;
        product.name = Some(name.to_string());
        product
            .metadata
            .insert("sanity_slug".to_string(), catalogue_slug.to_string());
        Ok(product.clone())
    }

    async fn retrieve_price(&self, id: &str) -> Result<Price, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .prices
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::ResourceMissing, "no such price"))
    }

    async fn create_recurring_price(
        &self,
        product_id: &str,
        amount_minor: i64,
        _currency: &str,
    ) -> Result<Price, ProviderError> {
        let id = self.next_id("price");
        let price = Price {
            id: id.clone(),
            product: product_id.to_string(),
            unit_amount: Some(amount_minor),
        };
        let mut state = self.state.lock().unwrap();
        state.prices.insert(id, price.clone());
        state.created_prices.push(price.clone());
        Ok(price)
    }
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, Value>,
    patches: u64,
    asset_failures: Vec<String>,
}

/// Document-store double that answers the crate's known queries against
/// an in-memory document map instead of interpreting the query language.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
    counter: AtomicU64,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }

    pub fn seed_service(&self, id: &str, title: &str, slug: &str, has_brief: bool) {
        let brief = if has_brief {
            json!({
                "title": format!("{title} Brief"),
                "fields": [{"key": "goals", "label": "Project goals"}]
            })
        } else {
            Value::Null
        };
        self.state.lock().unwrap().documents.insert(
            id.to_string(),
            json!({
                "_id": id,
                "_type": "service",
                "title": title,
                "slug": slug,
                "stripePriceId": Value::Null,
                "projectBrief": brief,
            }),
        );
    }

    pub fn seed_one_off_order(
        &self,
        payment_intent_id: &str,
        service_id: &str,
        status: &str,
        email: &str,
        name: &str,
    ) -> String {
        let id = self.next_id("order-");
        self.state.lock().unwrap().documents.insert(
            id.clone(),
            json!({
                "_id": id,
                "_type": "order",
                "service": {"_type": "reference", "_ref": service_id},
                "stripePaymentIntentId": payment_intent_id,
                "oneOffStatus": status,
                "customerEmail": email,
                "customerName": name,
                "projectBrief": "Pending submission...",
            }),
        );
        id
    }

    pub fn seed_subscription_order(
        &self,
        subscription_id: &str,
        service_id: &str,
        status: &str,
    ) -> String {
        let id = self.next_id("order-");
        self.state.lock().unwrap().documents.insert(
            id.clone(),
            json!({
                "_id": id,
                "_type": "order",
                "service": {"_type": "reference", "_ref": service_id},
                "stripeSubscriptionId": subscription_id,
                "subscriptionStatus": status,
                "customerEmail": "a@b.com",
                "customerName": "A B",
            }),
        );
        id
    }

    pub fn seed_quote(&self, id: &str, name: &str, email: &str, price: f64) {
        self.state.lock().unwrap().documents.insert(
            id.to_string(),
            json!({
                "_id": id,
                "_type": "quote",
                "customerName": name,
                "customerEmail": email,
                "projectDescription": "A project",
                "estimatedPrice": price,
                "status": "new",
            }),
        );
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().documents.get(id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .documents
            .values()
            .filter(|doc| doc["_type"] == json!("order"))
            .count()
    }

    pub fn patch_count(&self) -> u64 {
        self.state.lock().unwrap().patches
    }

    /// Makes uploads for the named file fail, for degraded-upload tests.
    pub fn fail_asset_upload(&self, filename: &str) {
        self.state
            .lock()
            .unwrap()
            .asset_failures
            .push(filename.to_string());
    }

    fn service_brief(&self, state: &StoreState, service_id: &str) -> Value {
        state
            .documents
            .get(service_id)
            .map(|doc| doc["projectBrief"].clone())
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl ContentStore for MockStore {
    async fn fetch(&self, query: &str, params: &[(&str, Value)]) -> Result<Value, StoreError> {
        let state = self.state.lock().unwrap();
        let result = match query {
            ORDER_BY_PAYMENT_INTENT_QUERY => state
                .documents
                .values()
                .find(|doc| {
                    doc["_type"] == json!("order")
                        && doc["stripePaymentIntentId"] == *param(params, "paymentIntentId")
                })
                .map(|doc| json!({"_id": doc["_id"]}))
                .unwrap_or(Value::Null),
            ORDER_BY_SUBSCRIPTION_QUERY => state
                .documents
                .values()
                .find(|doc| {
                    doc["_type"] == json!("order")
                        && doc["stripeSubscriptionId"] == *param(params, "subscriptionId")
                })
                .map(|doc| {
                    let service_id = doc["service"]["_ref"].as_str().unwrap_or_default();
                    json!({
                        "_id": doc["_id"],
                        "subscriptionStatus": doc["subscriptionStatus"],
                        "briefForm": self.service_brief(&state, service_id),
                    })
                })
                .unwrap_or(Value::Null),
            ORDER_CONTACT_QUERY => state
                .documents
                .get(param(params, "orderId").as_str().unwrap_or_default())
                .map(|doc| {
                    let service_id = doc["service"]["_ref"].as_str().unwrap_or_default();
                    let service_name = state
                        .documents
                        .get(service_id)
                        .map(|s| s["title"].clone())
                        .unwrap_or(Value::Null);
                    json!({
                        "customerEmail": doc["customerEmail"],
                        "customerName": doc["customerName"],
                        "oneOffStatus": doc["oneOffStatus"],
                        "serviceName": service_name,
                    })
                })
                .unwrap_or(Value::Null),
            SERVICE_BY_ID_QUERY => state
                .documents
                .get(param(params, "serviceId").as_str().unwrap_or_default())
                .filter(|doc| doc["_type"] == json!("service"))
                .cloned()
                .unwrap_or(Value::Null),
            SERVICE_BY_SLUG_QUERY => state
                .documents
                .values()
                .find(|doc| {
                    doc["_type"] == json!("service") && doc["slug"] == *param(params, "slug")
                })
                .cloned()
                .unwrap_or(Value::Null),
            QUOTE_BY_ID_QUERY => state
                .documents
                .get(param(params, "quoteId").as_str().unwrap_or_default())
                .filter(|doc| doc["_type"] == json!("quote"))
                .cloned()
                .unwrap_or(Value::Null),
            other => {
                return Err(StoreError::Api {
                    status: 400,
                    message: format!("unrecognized query in test double: {other}"),
                })
            }
        };
        Ok(result)
    }

    async fn create(&self, mut document: Value) -> Result<String, StoreError> {
        let id = self.next_id("doc-");
        if let Some(map) = document.as_object_mut() {
            map.insert("_id".to_string(), json!(id));
        }
        self.state.lock().unwrap().documents.insert(id.clone(), document);
        Ok(id)
    }

    async fn patch(&self, patch: DocumentPatch) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let document = state.documents.get_mut(&patch.id).ok_or(StoreError::Api {
            status: 404,
            message: format!("document {} not found", patch.id),
        })?;
        if let Some(map) = document.as_object_mut() {
            for (key, value) in &patch.set {
                map.insert(key.clone(), value.clone());
            }
            for key in &patch.unset {
                map.remove(key);
            }
        }
        state.patches += 1;
        Ok(())
    }

    async fn upload_asset(&self, filename: &str, _data: Bytes) -> Result<String, StoreError> {
        let state_failures = {
            let state = self.state.lock().unwrap();
            state.asset_failures.contains(&filename.to_string())
        };
        if state_failures {
            return Err(StoreError::Api {
                status: 500,
                message: "asset pipeline unavailable".to_string(),
            });
        }
        let id = self.next_id("file-");
        self.state.lock().unwrap().documents.insert(
            id.clone(),
            json!({"_id": id, "_type": "sanity.fileAsset", "originalFilename": filename}),
        );
        Ok(id)
    }
}

/// Recording mailer.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}
