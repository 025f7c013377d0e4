//! Integration tests for checkout session creation, deduplication, eviction,
//! expiry, and payment-intent creation.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn create_session_returns_same_id_for_permuted_cart() {
    let app = TestApp::new().await;
    let user = app.seed_user("Ada", "ada@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;
    let p1 = app.seed_product(shop.id, "Keyboard", dec!(100), 10).await;
    let p2 = app.seed_product(shop.id, "Mouse", dec!(50), 10).await;

    let line1 = json!({"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100});
    let line2 = json!({"product_id": p2.id, "shop_id": shop.id, "quantity": 2, "unit_price": 50});

    let first = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({"user_id": user.id, "cart": [line1, line2]})),
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_json(first).await;
    assert_eq!(first["data"]["reused"], false);
    let session_id = first["data"]["session_id"].as_str().unwrap().to_string();

    // Same logical cart, submitted in reverse order
    let line1 = json!({"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100});
    let line2 = json!({"product_id": p2.id, "shop_id": shop.id, "quantity": 2, "unit_price": 50});
    let second = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({"user_id": user.id, "cart": [line2, line1]})),
        )
        .await;
    assert_eq!(second.status(), StatusCode::CREATED);
    let second = response_json(second).await;

    assert_eq!(second["data"]["session_id"].as_str().unwrap(), session_id);
    assert_eq!(second["data"]["reused"], true);
}

#[tokio::test]
async fn create_session_evicts_previous_session_with_different_cart() {
    let app = TestApp::new().await;
    let user = app.seed_user("Bo", "bo@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;
    let p1 = app.seed_product(shop.id, "Keyboard", dec!(100), 10).await;

    let first = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [{"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100}]
            })),
        )
        .await;
    let first = response_json(first).await;
    let old_session = first["data"]["session_id"].as_str().unwrap().to_string();

    // Different quantity, hence a different fingerprint
    let second = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [{"product_id": p1.id, "shop_id": shop.id, "quantity": 3, "unit_price": 100}]
            })),
        )
        .await;
    let second = response_json(second).await;
    let new_session = second["data"]["session_id"].as_str().unwrap().to_string();
    assert_ne!(old_session, new_session);

    // The stale session is gone; the new one resolves
    let old = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{}", old_session),
            None,
        )
        .await;
    assert_eq!(old.status(), StatusCode::NOT_FOUND);

    let new = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{}", new_session),
            None,
        )
        .await;
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_session_rejects_empty_cart() {
    let app = TestApp::new().await;
    let user = app.seed_user("Cy", "cy@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({"user_id": user.id, "cart": []})),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_session_rejects_unknown_product() {
    let app = TestApp::new().await;
    let user = app.seed_user("Di", "di@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [{"product_id": uuid::Uuid::new_v4(), "shop_id": shop.id, "quantity": 1, "unit_price": 10}]
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_expires_after_ttl() {
    let app = TestApp::with_session_ttl(1).await;
    let user = app.seed_user("Ed", "ed@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;
    let p1 = app.seed_product(shop.id, "Keyboard", dec!(100), 10).await;

    let created = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [{"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100}]
            })),
        )
        .await;
    let created = response_json(created).await;
    let session_id = created["data"]["session_id"].as_str().unwrap().to_string();

    let live = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{}", session_id),
            None,
        )
        .await;
    assert_eq!(live.status(), StatusCode::OK);

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let expired = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{}", session_id),
            None,
        )
        .await;
    assert_eq!(expired.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_intent_routes_to_seller_with_platform_fee() {
    let app = TestApp::new().await;
    let user = app.seed_user("Fay", "fay@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;
    let p1 = app.seed_product(shop.id, "Keyboard", dec!(100), 10).await;
    let p2 = app.seed_product(shop.id, "Mouse", dec!(50), 10).await;

    let created = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [
                    {"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100},
                    {"product_id": p2.id, "shop_id": shop.id, "quantity": 2, "unit_price": 50}
                ]
            })),
        )
        .await;
    let created = response_json(created).await;
    let session_id = created["data"]["session_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/intent", session_id),
            Some(json!({"amount": 200})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["data"]["client_secret"].as_str().is_some());

    let requests = app.gateway.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.amount_minor, 20_000);
    assert_eq!(request.application_fee_minor, 2_000);
    assert_eq!(request.destination_account, "acct_a");
    assert_eq!(request.metadata.session_id, session_id);
    assert_eq!(request.metadata.user_id, user.id);
}

#[tokio::test]
async fn create_intent_rejects_mismatched_amount() {
    let app = TestApp::new().await;
    let user = app.seed_user("Gil", "gil@example.com").await;
    let shop = app.seed_shop("Shop A", "acct_a").await;
    let p1 = app.seed_product(shop.id, "Keyboard", dec!(100), 10).await;

    let created = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions",
            Some(json!({
                "user_id": user.id,
                "cart": [{"product_id": p1.id, "shop_id": shop.id, "quantity": 1, "unit_price": 100}]
            })),
        )
        .await;
    let created = response_json(created).await;
    let session_id = created["data"]["session_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/intent", session_id),
            Some(json!({"amount": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn create_intent_for_unknown_session_is_404() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/sessions/cs_does_not_exist/intent",
            Some(json!({"amount": 10})),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
