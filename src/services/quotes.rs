//! Quote intake and the admin pricing action.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use crate::clients::content::{fetch_one, ContentStore, DocumentPatch};
use crate::clients::payment::{PaymentProvider, QuoteCheckoutParams};
use crate::errors::ServiceError;
use crate::models::quote::{QuoteDoc, QuoteStatus};
use crate::notifications::{dispatch, templates, Mailer};
use crate::services::reconciler::strip_draft_prefix;

pub const QUOTE_BY_ID_QUERY: &str = r#"*[_type == "quote" && _id == $quoteId][0]{_id, customerName, customerEmail, projectDescription, estimatedPrice, status}"#;

#[derive(Clone)]
pub struct QuoteService {
    payments: Arc<dyn PaymentProvider>,
    store: Arc<dyn ContentStore>,
    mailer: Arc<dyn Mailer>,
    site_url: String,
    currency: String,
    owner_email: String,
}

impl QuoteService {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        store: Arc<dyn ContentStore>,
        mailer: Arc<dyn Mailer>,
        site_url: String,
        currency: String,
        owner_email: String,
    ) -> Self {
        Self {
            payments,
            store,
            mailer,
            site_url,
            currency,
            owner_email,
        }
    }

    /// Records an inbound quote request and notifies the site owner.
    /// The notification is fire-and-forget.
    #[instrument(skip(self, project_description))]
    pub async fn submit(
        &self,
        customer_name: &str,
        customer_email: &str,
        project_description: &str,
    ) -> Result<String, ServiceError> {
        let doc = json!({
            "_type": "quote",
            "customerName": customer_name,
            "customerEmail": customer_email,
            "projectDescription": project_description,
            "status": QuoteStatus::New,
        });
        let quote_id = self.store.create(doc).await?;

        let message = templates::owner_notification(
            &self.owner_email,
            "New Quote Request",
            customer_name,
            customer_email,
            project_description,
        );
        dispatch(self.mailer.as_ref(), message).await;

        info!(quote_id = %quote_id, "recorded quote request");
        Ok(quote_id)
    }

    /// Admin pricing action: opens a one-off checkout for the estimated
    /// amount and moves the quote to `estimated` with the link attached.
    #[instrument(skip(self))]
    pub async fn create_checkout(
        &self,
        quote_id: &str,
        customer_name: &str,
        customer_email: &str,
        estimated_price: f64,
    ) -> Result<String, ServiceError> {
        let quote_id = strip_draft_prefix(quote_id);

        let quote: Option<QuoteDoc> = fetch_one(
            self.store.as_ref(),
            QUOTE_BY_ID_QUERY,
            &[("quoteId", json!(quote_id))],
        )
        .await?;
        let quote =
            quote.ok_or_else(|| ServiceError::NotFound(format!("quote {quote_id} not found")))?;

        let customer = match self.payments.find_customer_by_email(customer_email).await? {
            Some(existing) => existing,
            None => {
                self.payments
                    .create_customer(customer_email, customer_name)
                    .await?
            }
        };

        let amount_minor = (estimated_price * 100.0).round() as i64;
        if amount_minor <= 0 {
            return Err(ServiceError::ValidationError(
                "estimated price must be positive".into(),
            ));
        }

        let session = self
            .payments
            .create_quote_checkout(QuoteCheckoutParams {
                customer_id: customer.id,
                currency: self.currency.clone(),
                product_name: format!("Custom Project for {customer_name}"),
                description: "Custom project work as per agreed quote".to_string(),
                amount_minor,
                quote_id: quote.id.clone(),
                success_url: format!("{}/quote-payment-success", self.site_url),
                cancel_url: format!("{}/quote-payment-cancelled", self.site_url),
            })
            .await?;
        let url = session.url.ok_or_else(|| {
            ServiceError::PaymentProvider("checkout session carried no url".into())
        })?;

        self.store
            .patch(
                DocumentPatch::new(quote.id.clone())
                    .set("checkoutLink", json!(url))
                    .set("status", json!(QuoteStatus::Estimated)),
            )
            .await?;

        info!(quote_id = %quote.id, "quote checkout created");
        Ok(url)
    }
}
