//! End-to-end checkout and admin flows over the full router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestApp, ADMIN_SECRET};

#[tokio::test]
async fn one_off_checkout_authorize_create_capture() {
    let app = TestApp::new();
    app.store
        .seed_service("svc-landing", "Landing Page", "landing-page", true);

    // Authorize: customer + manual-capture hold
    let (status, body) = app
        .post_json(
            "/api/v1/checkout/authorize",
            json!({ "amount": 50000, "email": "a@b.com", "name": "A B" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let intent_id = body["paymentIntentId"].as_str().unwrap().to_string();
    assert!(body["clientSecret"].as_str().unwrap().contains("secret"));
    assert_eq!(app.provider.customer_count(), 1);

    // Create the order document
    let (status, body) = app
        .post_json(
            "/api/v1/checkout/orders",
            json!({ "paymentIntentId": intent_id, "serviceId": "svc-landing" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let order_id = body["orderId"].as_str().unwrap().to_string();

    let doc = app.store.document(&order_id).unwrap();
    assert_eq!(doc["oneOffStatus"], json!("new"));
    assert_eq!(doc["projectBrief"], json!("Pending submission..."));
    assert_eq!(doc["customerEmail"], json!("a@b.com"));

    // Admin captures the held funds
    let (status, body) = app
        .post_json_with_bearer(
            "/api/v1/admin/capture",
            json!({ "orderId": order_id, "paymentIntentId": intent_id }),
            ADMIN_SECRET,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["status"], json!("paid"));

    let doc = app.store.document(&order_id).unwrap();
    assert_eq!(doc["oneOffStatus"], json!("paid"));
    assert_eq!(app.provider.intent_status(&intent_id).as_deref(), Some("succeeded"));
    assert_eq!(app.mailer.sent_count(), 1);
}

#[tokio::test]
async fn create_order_repeat_returns_the_same_order() {
    let app = TestApp::new();
    app.store
        .seed_service("svc-landing", "Landing Page", "landing-page", false);
    app.provider.seed_customer("cus_1", "a@b.com", "A B");
    let intent_id = app.provider.seed_authorized_intent("cus_1", 50000);

    let payload = json!({ "paymentIntentId": intent_id, "serviceId": "svc-landing" });
    let (_, first) = app.post_json("/api/v1/checkout/orders", payload.clone()).await;
    let (status, second) = app.post_json("/api/v1/checkout/orders", payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["orderId"], second["orderId"]);
    assert_eq!(app.store.order_count(), 1);
}

#[tokio::test]
async fn capture_twice_stays_paid_and_emails_once() {
    let app = TestApp::new();
    app.provider.seed_customer("cus_1", "a@b.com", "A B");
    let intent_id = app.provider.seed_authorized_intent("cus_1", 50000);
    let order_id = app
        .store
        .seed_one_off_order(&intent_id, "svc1", "completed", "a@b.com", "A B");

    let payload = json!({ "orderId": order_id, "paymentIntentId": intent_id });
    let (status, body) = app
        .post_json_with_bearer("/api/v1/admin/capture", payload.clone(), ADMIN_SECRET)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("paid"));

    let (status, body) = app
        .post_json_with_bearer("/api/v1/admin/capture", payload, ADMIN_SECRET)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["status"], json!("paid"));
    assert!(body["message"].as_str().is_some());

    assert_eq!(
        app.store.document(&order_id).unwrap()["oneOffStatus"],
        json!("paid")
    );
    assert_eq!(app.mailer.sent_count(), 1);
}

#[tokio::test]
async fn capture_of_a_cancelled_order_is_refused() {
    let app = TestApp::new();
    app.provider.seed_customer("cus_1", "a@b.com", "A B");
    let intent_id = app.provider.seed_authorized_intent("cus_1", 50000);
    let order_id = app
        .store
        .seed_one_off_order(&intent_id, "svc1", "cancelled", "a@b.com", "A B");

    let (status, body) = app
        .post_json_with_bearer(
            "/api/v1/admin/capture",
            json!({ "orderId": order_id, "paymentIntentId": intent_id }),
            ADMIN_SECRET,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    // Funds stay held, the document stays cancelled, and no email goes out.
    assert_eq!(
        app.provider.intent_status(&intent_id).as_deref(),
        Some("requires_capture")
    );
    assert_eq!(
        app.store.document(&order_id).unwrap()["oneOffStatus"],
        json!("cancelled")
    );
    assert_eq!(app.store.patch_count(), 0);
    assert_eq!(app.mailer.sent_count(), 0);
}

#[tokio::test]
async fn cancel_payment_intent_twice_stays_cancelled() {
    let app = TestApp::new();
    app.provider.seed_customer("cus_1", "a@b.com", "A B");
    let intent_id = app.provider.seed_authorized_intent("cus_1", 50000);
    let order_id = app
        .store
        .seed_one_off_order(&intent_id, "svc1", "new", "a@b.com", "A B");

    let payload = json!({ "orderId": order_id, "paymentIntentId": intent_id });
    for _ in 0..2 {
        let (status, body) = app
            .post_json_with_bearer(
                "/api/v1/admin/cancel-payment-intent",
                payload.clone(),
                ADMIN_SECRET,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["status"], json!("cancelled"));
    }

    assert_eq!(
        app.store.document(&order_id).unwrap()["oneOffStatus"],
        json!("cancelled")
    );
}

#[tokio::test]
async fn admin_routes_require_the_shared_secret() {
    let app = TestApp::new();
    let payload = json!({ "orderId": "order-1", "paymentIntentId": "pi_1" });

    let (status, body) = app
        .post_json("/api/v1/admin/capture", payload.clone())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some());

    let (status, _) = app
        .post_json_with_bearer("/api/v1/admin/capture", payload, "wrong-secret")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // No provider call, no document mutation
    assert_eq!(app.store.patch_count(), 0);
}

#[tokio::test]
async fn subscription_checkout_completion_is_idempotent_across_refreshes() {
    let app = TestApp::new();
    app.store
        .seed_service("svc-retainer", "Retainer", "retainer", true);
    let (session_id, _) = app.provider.seed_subscription_session("a@b.com", "A B");

    let payload = json!({ "sessionId": session_id, "serviceSlug": "retainer" });
    let (status, first) = app
        .post_json("/api/v1/checkout/subscriptions/complete", payload.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(first["projectBrief"].is_object());

    let (status, second) = app
        .post_json("/api/v1/checkout/subscriptions/complete", payload)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["orderId"], second["orderId"]);
    assert_eq!(app.store.order_count(), 1);

    let doc = app
        .store
        .document(first["orderId"].as_str().unwrap())
        .unwrap();
    assert_eq!(doc["subscriptionStatus"], json!("inProgress"));
    assert_eq!(doc["projectBrief"], json!("Pending submission..."));
}

#[tokio::test]
async fn create_session_returns_the_hosted_checkout_url() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/checkout/sessions",
            json!({ "priceId": "price_1", "serviceSlug": "retainer" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().starts_with("https://"));

    let recorded = app.provider.subscription_checkouts();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, "price_1");
    assert!(recorded[0].1.contains("service=retainer"));
    assert!(recorded[0].1.contains("{CHECKOUT_SESSION_ID}"));
}

#[tokio::test]
async fn admin_cancel_subscription_defers_the_order_patch_to_the_webhook() {
    let app = TestApp::new();
    let sub_id = app.provider.seed_subscription("active");
    let order_id = app
        .store
        .seed_subscription_order(&sub_id, "svc1", "inProgress");

    let (status, body) = app
        .post_json_with_bearer(
            "/api/v1/admin/cancel-subscription",
            json!({ "subscriptionId": sub_id }),
            ADMIN_SECRET,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    assert_eq!(app.provider.subscription_status(&sub_id).as_deref(), Some("canceled"));
    assert_eq!(
        app.store.document(&order_id).unwrap()["subscriptionStatus"],
        json!("inProgress")
    );
}

#[tokio::test]
async fn authorize_rejects_invalid_payloads_before_any_remote_call() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/checkout/authorize",
            json!({ "amount": 0, "email": "not-an-email", "name": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
    assert_eq!(app.provider.customer_count(), 0);
}

#[tokio::test]
async fn quote_checkout_attaches_the_link_and_estimates_the_quote() {
    let app = TestApp::new();
    app.store.seed_quote("quote-1", "A B", "a@b.com", 450.50);

    let (status, body) = app
        .post_json_with_bearer(
            "/api/v1/admin/quote-checkout",
            json!({
                "quoteId": "drafts.quote-1",
                "customerName": "A B",
                "customerEmail": "a@b.com",
                "estimatedPrice": 450.50
            }),
            ADMIN_SECRET,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();

    let doc = app.store.document("quote-1").unwrap();
    assert_eq!(doc["status"], json!("estimated"));
    assert_eq!(doc["checkoutLink"], json!(url));
    assert_eq!(app.provider.quote_checkouts()[0].amount_minor, 45050);
}

#[tokio::test]
async fn brief_submission_folds_fields_and_uploads_files() {
    let app = TestApp::new();
    app.provider.seed_customer("cus_1", "a@b.com", "A B");
    let intent_id = app.provider.seed_authorized_intent("cus_1", 50000);
    let order_id = app
        .store
        .seed_one_off_order(&intent_id, "svc1", "new", "a@b.com", "A B");

    let boundary = "intake-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"orderId\"\r\n\r\n{order_id}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"Project goals\"\r\n\r\nLaunch a storefront\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"logo\"; filename=\"logo.png\"\r\n\
         Content-Type: image/png\r\n\r\nnot-really-a-png\r\n\
         --{b}--\r\n",
        b = boundary
    );

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/briefs")
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(axum::body::Body::from(body))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc = app.store.document(&order_id).unwrap();
    let brief = doc["projectBrief"].as_str().unwrap();
    assert!(brief.contains("Project goals:\nLaunch a storefront"));
    assert_eq!(doc["briefFiles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn contact_enquiry_is_forwarded_to_the_owner() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/contact",
            json!({ "name": "A B", "email": "a@b.com", "message": "Hello there" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@storefront.test");
    assert!(sent[0].html.contains("Hello there"));
}

#[tokio::test]
async fn status_and_health_report_the_service() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .uri("/api/v1/status")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = axum::http::Request::builder()
        .uri("/api/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
