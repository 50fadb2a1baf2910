use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Intake form definition referenced by a service; forwarded to the
/// client after checkout so the buyer can submit the project brief.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BriefForm {
    pub title: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// A catalogue `service` document. `stripe_price_id` is synced from the
/// payment provider by the `price.created` webhook handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, rename = "stripePriceId")]
    pub stripe_price_id: Option<String>,
    #[serde(default, rename = "projectBrief")]
    pub project_brief: Option<BriefForm>,
}
