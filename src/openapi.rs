use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct AdminBearer;

impl Modify for AdminBearer {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Admin shared secret"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
Order and payment reconciliation service for a services storefront.

- **Checkout**: manual-capture one-off payments and provider-hosted subscription checkouts
- **Admin**: capture/cancel actions invoked from the content studio, quote payment links
- **Webhooks**: signed payment-provider events driving catalogue sync and subscription lifecycle
- **Intake**: project briefs, quote requests, and contact enquiries

Admin endpoints require the shared secret:

```
Authorization: Bearer <admin secret>
```

Errors respond as `{ "error": "<message>" }` with a matching HTTP status.
        "#
    ),
    tags(
        (name = "Checkout", description = "Buyer-facing checkout endpoints"),
        (name = "Admin", description = "Studio-invoked administrative actions"),
        (name = "Webhooks", description = "Payment provider and content lake event receivers"),
        (name = "Intake", description = "Briefs, quotes, and contact forms")
    ),
    paths(
        crate::handlers::checkout::authorize,
        crate::handlers::checkout::create_order,
        crate::handlers::checkout::create_session,
        crate::handlers::checkout::complete_subscription,
        crate::handlers::admin::capture,
        crate::handlers::admin::cancel_payment_intent,
        crate::handlers::admin::cancel_subscription,
        crate::handlers::admin::quote_checkout,
        crate::handlers::webhooks::payment_webhook,
        crate::handlers::webhooks::content_webhook,
        crate::handlers::intake::submit_brief,
        crate::handlers::intake::submit_quote,
        crate::handlers::intake::contact,
    ),
    components(
        schemas(
            crate::handlers::checkout::AuthorizeRequest,
            crate::handlers::checkout::AuthorizeResponse,
            crate::handlers::checkout::CreateOrderRequest,
            crate::handlers::checkout::CreateOrderResponse,
            crate::handlers::checkout::CreateSessionRequest,
            crate::handlers::checkout::CreateSessionResponse,
            crate::handlers::checkout::CompleteSubscriptionRequest,
            crate::handlers::checkout::CompleteSubscriptionResponse,
            crate::handlers::admin::ActionResponse,
            crate::handlers::admin::CaptureRequest,
            crate::handlers::admin::CancelIntentRequest,
            crate::handlers::admin::CancelSubscriptionRequest,
            crate::handlers::admin::QuoteCheckoutRequest,
            crate::handlers::admin::QuoteCheckoutResponse,
            crate::handlers::intake::ContactRequest,
            crate::handlers::intake::ContactResponse,
            crate::errors::ErrorResponse,
        )
    ),
    modifiers(&AdminBearer)
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
