//! Catalogue <-> provider price sync.
//!
//! The loop has two halves. The content lake's change webhook delivers
//! edited `service` documents; [`CatalogueService::sync_service`]
//! mirrors recurring services into a provider Product (marked with a
//! `sanity_slug` metadata entry) and creates a new recurring Price
//! whenever the catalogue amount drifts from the provider's. The
//! provider then fires `price.created`, and
//! [`CatalogueService::sync_price`] writes the fresh price id back
//! onto the marked service. Prices created under unmarked products are
//! acknowledged and ignored.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::clients::content::{fetch_one, ContentStore, DocumentPatch};
use crate::clients::payment::PaymentProvider;
use crate::errors::ServiceError;
use crate::models::ServiceDoc;
use crate::services::reconciler::SERVICE_BY_SLUG_QUERY;

pub const SLUG_MARKER_KEY: &str = "sanity_slug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSyncOutcome {
    Synced,
    /// The product carries no catalogue marker; not ours to sync.
    SkippedNoMarker,
    /// Marker present but no catalogue entry matches it.
    ServiceNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSyncOutcome {
    /// Only recurring services are mirrored to the provider.
    SkippedNotRecurring,
    /// Missing title, slug, or price; nothing to mirror yet.
    SkippedIncomplete,
    Synced {
        product_id: String,
        price_created: bool,
    },
}

/// The `service` document shape delivered by the content lake's change
/// webhook. Everything beyond `_id` is optional: studio drafts arrive
/// half-filled.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "serviceType")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub slug: Option<SlugField>,
    #[serde(default, rename = "priceGBP")]
    pub price: Option<f64>,
    #[serde(default, rename = "stripeProductId")]
    pub stripe_product_id: Option<String>,
    #[serde(default, rename = "stripePriceId")]
    pub stripe_price_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlugField {
    #[serde(default)]
    pub current: Option<String>,
}

#[derive(Clone)]
pub struct CatalogueService {
    payments: Arc<dyn PaymentProvider>,
    store: Arc<dyn ContentStore>,
    currency: String,
}

impl CatalogueService {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        store: Arc<dyn ContentStore>,
        currency: String,
    ) -> Self {
        Self {
            payments,
            store,
            currency,
        }
    }

    /// Writes a newly created price onto its marked catalogue service.
    #[instrument(skip(self))]
    pub async fn sync_price(
        &self,
        price_id: &str,
        product_id: &str,
    ) -> Result<PriceSyncOutcome, ServiceError> {
        let product = self.payments.retrieve_product(product_id).await?;

        let Some(slug) = product.metadata.get(SLUG_MARKER_KEY) else {
            info!(product_id = %product_id, "product carries no catalogue marker, skipping");
            return Ok(PriceSyncOutcome::SkippedNoMarker);
        };

        let service: Option<ServiceDoc> = fetch_one(
            self.store.as_ref(),
            SERVICE_BY_SLUG_QUERY,
            &[("slug", json!(slug))],
        )
        .await?;
        let Some(service) = service else {
            warn!(slug = %slug, price_id = %price_id, "no catalogue service matches marker");
            return Ok(PriceSyncOutcome::ServiceNotFound);
        };

        self.store
            .patch(DocumentPatch::new(service.id.clone()).set("stripePriceId", json!(price_id)))
            .await?;

        info!(service_id = %service.id, price_id = %price_id, "catalogue price synced");
        Ok(PriceSyncOutcome::Synced)
    }

    /// Mirrors an edited recurring service into the provider catalogue:
    /// creates or updates the marked Product, then creates a new
    /// recurring Price when the catalogue amount differs from the
    /// current one. The new price id is NOT patched here; the
    /// provider's `price.created` delivery closes the loop through
    /// [`Self::sync_price`].
    #[instrument(skip(self, snapshot), fields(service_id = %snapshot.id))]
    pub async fn sync_service(
        &self,
        snapshot: ServiceSnapshot,
    ) -> Result<ServiceSyncOutcome, ServiceError> {
        if snapshot.service_type.as_deref() != Some("recurring") {
            info!("not a recurring service, skipping");
            return Ok(ServiceSyncOutcome::SkippedNotRecurring);
        }

        let slug = snapshot.slug.as_ref().and_then(|s| s.current.as_deref());
        let (Some(title), Some(slug), Some(price)) =
            (snapshot.title.as_deref(), slug, snapshot.price)
        else {
            warn!("service is missing title, slug, or price, skipping");
            return Ok(ServiceSyncOutcome::SkippedIncomplete);
        };

        let product_id = match snapshot.stripe_product_id.as_deref() {
            Some(id) => {
                self.payments.update_product(id, title, slug).await?;
                info!(product_id = %id, "updated provider product");
                id.to_string()
            }
            None => {
                let product = self.payments.create_product(title, slug).await?;
                self.store
                    .patch(
                        DocumentPatch::new(snapshot.id.clone())
                            .set("stripeProductId", json!(product.id)),
                    )
                    .await?;
                info!(product_id = %product.id, "created provider product");
                product.id
            }
        };

        let target_minor = (price * 100.0).round() as i64;
        let current_minor = match snapshot.stripe_price_id.as_deref() {
            Some(price_id) => match self.payments.retrieve_price(price_id).await {
                Ok(current) if current.product == product_id => current.unit_amount,
                Ok(_) => None,
                Err(err) => {
                    warn!(price_id = %price_id, error = %err, "could not read the current price, creating a new one");
                    None
                }
            },
            None => None,
        };

        let price_created = current_minor != Some(target_minor);
        if price_created {
            let new_price = self
                .payments
                .create_recurring_price(&product_id, target_minor, &self.currency)
                .await?;
            info!(price_id = %new_price.id, amount_minor = target_minor, "created provider price");
        } else {
            info!(amount_minor = target_minor, "price already in sync");
        }

        Ok(ServiceSyncOutcome::Synced {
            product_id,
            price_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, MockStore};

    fn service(provider: Arc<MockProvider>, store: Arc<MockStore>) -> CatalogueService {
        CatalogueService::new(provider, store, "gbp".to_string())
    }

    fn snapshot(id: &str, service_type: &str, price: f64) -> ServiceSnapshot {
        ServiceSnapshot {
            id: id.to_string(),
            title: Some("Monthly Retainer".to_string()),
            service_type: Some(service_type.to_string()),
            slug: Some(SlugField {
                current: Some("retainer".to_string()),
            }),
            price: Some(price),
            stripe_product_id: None,
            stripe_price_id: None,
        }
    }

    #[tokio::test]
    async fn syncs_price_onto_marked_service() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[(SLUG_MARKER_KEY, "landing-page")]);
        let store = Arc::new(MockStore::new());
        store.seed_service("svc1", "Landing Page", "landing-page", false);
        let svc = service(provider, store.clone());

        let outcome = svc.sync_price("price_1", "prod_1").await.unwrap();
        assert_eq!(outcome, PriceSyncOutcome::Synced);
        assert_eq!(store.document("svc1").unwrap()["stripePriceId"], json!("price_1"));
    }

    #[tokio::test]
    async fn unmarked_product_is_skipped_without_mutation() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[]);
        let store = Arc::new(MockStore::new());
        store.seed_service("svc1", "Landing Page", "landing-page", false);
        let svc = service(provider, store.clone());

        let outcome = svc.sync_price("price_1", "prod_1").await.unwrap();
        assert_eq!(outcome, PriceSyncOutcome::SkippedNoMarker);
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn missing_service_is_a_warning_not_an_error() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[(SLUG_MARKER_KEY, "no-such-slug")]);
        let store = Arc::new(MockStore::new());
        let svc = service(provider, store.clone());

        let outcome = svc.sync_price("price_1", "prod_1").await.unwrap();
        assert_eq!(outcome, PriceSyncOutcome::ServiceNotFound);
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn new_recurring_service_gets_product_and_price() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MockStore::new());
        store.seed_service("svc1", "Monthly Retainer", "retainer", false);
        let svc = service(provider.clone(), store.clone());

        let outcome = svc.sync_service(snapshot("svc1", "recurring", 99.0)).await.unwrap();

        let ServiceSyncOutcome::Synced {
            product_id,
            price_created,
        } = outcome
        else {
            panic!("expected a sync");
        };
        assert!(price_created);
        // The product carries the marker and the id is written back.
        let product = provider.product(&product_id).unwrap();
        assert_eq!(product.metadata.get(SLUG_MARKER_KEY).map(String::as_str), Some("retainer"));
        assert_eq!(
            store.document("svc1").unwrap()["stripeProductId"],
            json!(product_id)
        );
        assert_eq!(provider.created_prices().len(), 1);
        assert_eq!(provider.created_prices()[0].unit_amount, Some(9900));
    }

    #[tokio::test]
    async fn existing_product_is_updated_not_recreated() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[(SLUG_MARKER_KEY, "old-slug")]);
        let store = Arc::new(MockStore::new());
        store.seed_service("svc1", "Monthly Retainer", "retainer", false);
        let svc = service(provider.clone(), store.clone());

        let mut snap = snapshot("svc1", "recurring", 99.0);
        snap.stripe_product_id = Some("prod_1".to_string());
        svc.sync_service(snap).await.unwrap();

        assert_eq!(provider.product_count(), 1);
        let product = provider.product("prod_1").unwrap();
        assert_eq!(product.metadata.get(SLUG_MARKER_KEY).map(String::as_str), Some("retainer"));
        // No stripeProductId backfill needed for a known product.
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn one_off_services_are_not_mirrored() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MockStore::new());
        let svc = service(provider.clone(), store.clone());

        let outcome = svc.sync_service(snapshot("svc1", "oneOff", 99.0)).await.unwrap();
        assert_eq!(outcome, ServiceSyncOutcome::SkippedNotRecurring);
        assert_eq!(provider.product_count(), 0);
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn half_filled_drafts_are_skipped() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MockStore::new());
        let svc = service(provider.clone(), store.clone());

        let mut snap = snapshot("svc1", "recurring", 99.0);
        snap.price = None;
        let outcome = svc.sync_service(snap).await.unwrap();
        assert_eq!(outcome, ServiceSyncOutcome::SkippedIncomplete);
        assert_eq!(provider.product_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_price_creates_nothing() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[(SLUG_MARKER_KEY, "retainer")]);
        provider.seed_price("price_1", "prod_1", 9900);
        let store = Arc::new(MockStore::new());
        let svc = service(provider.clone(), store.clone());

        let mut snap = snapshot("svc1", "recurring", 99.0);
        snap.stripe_product_id = Some("prod_1".to_string());
        snap.stripe_price_id = Some("price_1".to_string());
        let outcome = svc.sync_service(snap).await.unwrap();

        assert_eq!(
            outcome,
            ServiceSyncOutcome::Synced {
                product_id: "prod_1".to_string(),
                price_created: false,
            }
        );
        assert!(provider.created_prices().is_empty());
    }

    #[tokio::test]
    async fn drifted_price_creates_a_new_one_without_patching_the_id() {
        let provider = Arc::new(MockProvider::new());
        provider.seed_product("prod_1", &[(SLUG_MARKER_KEY, "retainer")]);
        provider.seed_price("price_1", "prod_1", 9900);
        let store = Arc::new(MockStore::new());
        store.seed_service("svc1", "Monthly Retainer", "retainer", false);
        let svc = service(provider.clone(), store.clone());

        let mut snap = snapshot("svc1", "recurring", 120.0);
        snap.stripe_product_id = Some("prod_1".to_string());
        snap.stripe_price_id = Some("price_1".to_string());
        let outcome = svc.sync_service(snap).await.unwrap();

        assert!(matches!(
            outcome,
            ServiceSyncOutcome::Synced {
                price_created: true,
                ..
            }
        ));
        assert_eq!(provider.created_prices()[0].unit_amount, Some(12000));
        // stripePriceId is the price.created handler's to write.
        assert_eq!(store.patch_count(), 0);
    }
}
