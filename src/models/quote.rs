use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Pre-sales lead lifecycle. A quote gains a generated checkout link
/// when an admin sets an estimated price, which moves it to `estimated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum QuoteStatus {
    New,
    Estimated,
    Converted,
    Declined,
}

/// A `quote` document as stored in the content lake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: QuoteStatus,
    #[serde(default, rename = "customerName")]
    pub customer_name: Option<String>,
    #[serde(default, rename = "customerEmail")]
    pub customer_email: Option<String>,
    #[serde(default, rename = "projectDescription")]
    pub project_description: Option<String>,
    #[serde(default, rename = "estimatedPrice")]
    pub estimated_price: Option<f64>,
    #[serde(default, rename = "checkoutLink")]
    pub checkout_link: Option<String>,
}
