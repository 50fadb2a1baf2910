//! Provider webhook behavior over the full router: signature gating,
//! event dispatch, and the ack contract.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{sign_webhook, TestApp, WEBHOOK_SECRET};

#[tokio::test]
async fn rejects_an_invalid_signature_without_touching_anything() {
    let app = TestApp::new();
    let order_id = app.store.seed_subscription_order("sub_1", "svc1", "inProgress");

    let body = json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_1" } }
    })
    .to_string();

    let (status, response) = app
        .post_webhook_raw(&body, "t=123,v1=deadbeef")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().is_some());

    // Zero mutations
    assert_eq!(app.store.patch_count(), 0);
    assert_eq!(
        app.store.document(&order_id).unwrap()["subscriptionStatus"],
        json!("inProgress")
    );
}

#[tokio::test]
async fn rejects_a_stale_signature() {
    let app = TestApp::new();
    let body = json!({ "type": "price.created", "data": { "object": {} } }).to_string();
    let stale = chrono::Utc::now().timestamp() - 3600;
    let signature = sign_webhook(WEBHOOK_SECRET, stale, &body);

    let (status, _) = app.post_webhook_raw(&body, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_deleted_cancels_the_matching_order() {
    let app = TestApp::new();
    let order_id = app.store.seed_subscription_order("sub_1", "svc1", "inProgress");

    let event = json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_1" } }
    });
    let (status, body) = app.post_webhook(event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(
        app.store.document(&order_id).unwrap()["subscriptionStatus"],
        json!("cancelled")
    );

    // Redelivery acks without a second patch
    let (status, _) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.patch_count(), 1);
}

#[tokio::test]
async fn subscription_deleted_with_no_matching_order_still_acks() {
    let app = TestApp::new();

    let event = json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_unknown" } }
    });
    let (status, body) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(app.store.patch_count(), 0);
}

#[tokio::test]
async fn subscription_updated_cancels_only_on_cancellation_signals() {
    let app = TestApp::new();
    let order_id = app.store.seed_subscription_order("sub_1", "svc1", "inProgress");

    // A routine update leaves the order alone
    let event = json!({
        "type": "customer.subscription.updated",
        "data": { "object": { "id": "sub_1", "status": "active", "cancel_at_period_end": false } }
    });
    let (status, _) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.patch_count(), 0);

    // Scheduled cancellation counts
    let event = json!({
        "type": "customer.subscription.updated",
        "data": { "object": { "id": "sub_1", "status": "active", "cancel_at_period_end": true } }
    });
    let (status, _) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.store.document(&order_id).unwrap()["subscriptionStatus"],
        json!("cancelled")
    );
}

#[tokio::test]
async fn price_created_syncs_a_marked_product() {
    let app = TestApp::new();
    app.provider
        .seed_product("prod_1", &[("sanity_slug", "landing-page")]);
    app.store
        .seed_service("svc1", "Landing Page", "landing-page", false);

    let event = json!({
        "type": "price.created",
        "data": { "object": { "id": "price_1", "product": "prod_1" } }
    });
    let (status, body) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(
        app.store.document("svc1").unwrap()["stripePriceId"],
        json!("price_1")
    );
}

#[tokio::test]
async fn price_created_without_the_marker_acks_with_zero_mutations() {
    let app = TestApp::new();
    app.provider.seed_product("prod_1", &[]);
    app.store
        .seed_service("svc1", "Landing Page", "landing-page", false);

    let event = json!({
        "type": "price.created",
        "data": { "object": { "id": "price_1", "product": "prod_1" } }
    });
    let (status, body) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(app.store.patch_count(), 0);
    assert!(app.store.document("svc1").unwrap()["stripePriceId"].is_null());
}

#[tokio::test]
async fn subscription_checkout_completion_sends_the_confirmation_email() {
    let app = TestApp::new();
    let sub_id = app.provider.seed_subscription_with_metadata(
        "active",
        &[("orderId", "order-1"), ("serviceName", "Retainer")],
    );

    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_1",
            "mode": "subscription",
            "subscription": sub_id,
            "customer_details": { "email": "a@b.com", "name": "A B" }
        } }
    });
    let (status, _) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert!(sent[0].html.contains("Retainer"));
}

#[tokio::test]
async fn checkout_completion_with_incomplete_metadata_acks_without_email() {
    let app = TestApp::new();
    let sub_id = app.provider.seed_subscription("active");

    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_1",
            "mode": "subscription",
            "subscription": sub_id,
            "customer_details": { "email": "a@b.com", "name": "A B" }
        } }
    });
    let (status, body) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(app.mailer.sent_count(), 0);
}

#[tokio::test]
async fn setup_mode_completion_reads_the_setup_intent_metadata() {
    let app = TestApp::new();
    app.provider.seed_setup_intent(
        "seti_1",
        &[
            ("orderId", "order-1"),
            ("customerEmail", "a@b.com"),
            ("customerName", "A B"),
            ("serviceName", "Landing Page"),
        ],
    );

    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_1", "mode": "setup", "setup_intent": "seti_1" } }
    });
    let (status, _) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@b.com");
    assert!(sent[0].html.contains("Landing Page"));
}

#[tokio::test]
async fn unknown_event_types_are_acked() {
    let app = TestApp::new();

    let event = json!({ "type": "invoice.finalized", "data": { "object": {} } });
    let (status, body) = app.post_webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
}

#[tokio::test]
async fn content_webhook_mirrors_a_new_recurring_service() {
    let app = TestApp::new();
    app.store
        .seed_service("svc1", "Care Plan", "care-plan", false);

    let document = json!({
        "_type": "service",
        "_id": "svc1",
        "title": "Care Plan",
        "serviceType": "recurring",
        "slug": { "current": "care-plan" },
        "priceGBP": 45.0
    });
    let (status, body) = app.post_content_webhook(document).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    let product_id = body["productId"].as_str().unwrap().to_string();

    // Product carries the slug marker and the doc got the ID back
    let product = app.provider.product(&product_id).unwrap();
    assert_eq!(product.metadata.get("sanity_slug").unwrap(), "care-plan");
    assert_eq!(
        app.store.document("svc1").unwrap()["stripeProductId"],
        json!(product_id)
    );

    let prices = app.provider.created_prices();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].unit_amount, Some(4500));
}

#[tokio::test]
async fn content_webhook_rejects_an_invalid_signature() {
    let app = TestApp::new();
    app.store
        .seed_service("svc1", "Care Plan", "care-plan", false);

    let body = json!({
        "_type": "service",
        "_id": "svc1",
        "title": "Care Plan",
        "serviceType": "recurring",
        "slug": { "current": "care-plan" },
        "priceGBP": 45.0
    })
    .to_string();

    let (status, _) = app
        .post_content_webhook_raw(&body, "t=123,v1=deadbeef")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.provider.product_count(), 0);
    assert_eq!(app.store.patch_count(), 0);
}

#[tokio::test]
async fn content_webhook_signed_with_the_payment_secret_is_rejected() {
    let app = TestApp::new();

    let body = json!({ "_type": "service", "_id": "svc1" }).to_string();
    let signature = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);

    let (status, _) = app.post_content_webhook_raw(&body, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_webhook_leaves_one_off_services_alone() {
    let app = TestApp::new();
    app.store
        .seed_service("svc1", "Landing Page", "landing-page", false);

    let document = json!({
        "_type": "service",
        "_id": "svc1",
        "title": "Landing Page",
        "serviceType": "oneOff",
        "slug": { "current": "landing-page" },
        "priceGBP": 900.0
    });
    let (status, body) = app.post_content_webhook(document).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert!(body["productId"].is_null());
    assert_eq!(app.provider.product_count(), 0);
    assert_eq!(app.store.patch_count(), 0);
}

#[tokio::test]
async fn content_webhook_skips_an_already_synced_price() {
    let app = TestApp::new();
    app.provider
        .seed_product("prod_1", &[("sanity_slug", "care-plan")]);
    app.provider.seed_price("price_1", "prod_1", 4500);
    app.store
        .seed_service("svc1", "Care Plan", "care-plan", false);

    let document = json!({
        "_type": "service",
        "_id": "svc1",
        "title": "Care Plan",
        "serviceType": "recurring",
        "slug": { "current": "care-plan" },
        "priceGBP": 45.0,
        "stripeProductId": "prod_1",
        "stripePriceId": "price_1"
    });
    let (status, body) = app.post_content_webhook(document).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["productId"], json!("prod_1"));
    assert_eq!(app.provider.created_prices().len(), 0);
}

#[tokio::test]
async fn content_webhook_acks_non_service_documents() {
    let app = TestApp::new();

    let document = json!({ "_type": "post", "_id": "post-1", "title": "Hello" });
    let (status, body) = app.post_content_webhook(document).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(app.provider.product_count(), 0);
}
