//! API Integration Tests
//!
//! Drive the full router with `oneshot`. Requires DATABASE_URL.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use ledger_service::identifier::{Identifier, ACCOUNT_PREFIX};

mod common;

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_user(app: &Router, tag: &str) -> Value {
    let response = send(
        app,
        post_json(
            "/api/v1/users",
            json!({ "email": common::unique_email(tag), "name": tag }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED, "user creation failed");
    body_json(response).await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = common::test_app(common::setup_ledger().await);

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_deposit_withdraw_and_balance_e2e() {
    let (app, _) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "e2e").await;
    let user_id = user["id"].as_str().unwrap();
    let internal = user["internal_account_id"].as_str().unwrap();

    // Zero balance renders as "0"
    let response = send(&app, get(&format!("/api/v1/accounts/{}/balance", internal))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["balance"], "0");

    // Deposit with accounts resolved from the user
    let response = send(
        &app,
        post_json("/api/v1/deposits", json!({ "amount": 100.25, "user_id": user_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let deposit = body_json(response).await;
    assert!(deposit["transaction_id"].as_str().unwrap().starts_with("txn_"));

    // Withdraw through the compatibility route
    let response = send(
        &app,
        post_json("/api/v1/withdraw_funds", json!({ "amount": 0.25, "user_id": user_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        get(&format!("/api/v1/get_account_balance?account_id={}", internal)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let balance = body_json(response).await;
    assert_eq!(balance["balance"], "100.00");
    assert_eq!(balance["balance_minor"], 10_000);

    // Listing by account
    let response = send(
        &app,
        get(&format!("/api/v1/transactions?account_id={}&limit=10", internal)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["transactions"].as_array().unwrap().len(), 2);
    assert!(page["next_cursor"].is_null());
}

#[tokio::test]
async fn test_insufficient_funds_response() {
    let (app, _) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "broke").await;

    let response = send(
        &app,
        post_json(
            "/api/v1/withdrawals",
            json!({ "amount": 10.0, "user_id": user["id"] }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "insufficient_funds");
}

#[tokio::test]
async fn test_idempotent_deposit_replays() {
    let (app, idempotency) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "idempotent").await;
    let internal = user["internal_account_id"].as_str().unwrap().to_string();
    let key = uuid::Uuid::new_v4().to_string();
    let body = json!({ "amount": 5.0, "user_id": user["id"] });

    let request = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/deposits")
            .header("content-type", "application/json")
            .header("Idempotency-Key", key.as_str())
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let first = send(&app, request(body.clone())).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get("idempotent-replayed").is_none());
    let first = body_json(first).await;

    let second = send(&app, request(body.clone())).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("idempotent-replayed").unwrap(), "true");
    assert_eq!(body_json(second).await, first);

    // Only one posting happened
    let response = send(&app, get(&format!("/api/v1/accounts/{}/balance", internal))).await;
    assert_eq!(body_json(response).await["balance_minor"], 500);

    // Same key, different body
    let reused = send(&app, request(json!({ "amount": 6.0, "user_id": user["id"] }))).await;
    assert_eq!(reused.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(reused).await["error_code"], "idempotency_key_reused");

    assert_eq!(idempotency.len(), 1);
}

#[tokio::test]
async fn test_deposit_key_reused_on_withdrawal_is_rejected() {
    let (app, idempotency) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "cross-op").await;
    let internal = user["internal_account_id"].as_str().unwrap().to_string();
    let key = uuid::Uuid::new_v4().to_string();
    let body = json!({ "amount": 5.0, "user_id": user["id"] });

    let request = |uri: &str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("Idempotency-Key", key.as_str())
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let deposit = send(&app, request("/api/v1/deposits")).await;
    assert_eq!(deposit.status(), StatusCode::OK);

    // Same key and body on a different operation is not a replay
    let withdrawal = send(&app, request("/api/v1/withdrawals")).await;
    assert_eq!(withdrawal.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(withdrawal.headers().get("idempotent-replayed").is_none());
    assert_eq!(body_json(withdrawal).await["error_code"], "idempotency_key_reused");

    // The deposit is still cached and nothing was withdrawn
    let replayed = send(&app, request("/api/v1/deposits")).await;
    assert_eq!(replayed.headers().get("idempotent-replayed").unwrap(), "true");

    let response = send(&app, get(&format!("/api/v1/accounts/{}/balance", internal))).await;
    assert_eq!(body_json(response).await["balance_minor"], 500);
    assert_eq!(idempotency.len(), 1);
}

#[tokio::test]
async fn test_failed_request_releases_idempotency_key() {
    let (app, idempotency) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "release").await;
    let key = uuid::Uuid::new_v4().to_string();

    let response = send(
        &app,
        post_json(
            "/api/v1/withdrawals",
            json!({ "amount": 1.0, "user_id": user["id"], "idempotency_key": key }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(idempotency.status(&key).is_none());
}

#[tokio::test]
async fn test_validation_errors() {
    let (app, _) = common::test_app(common::setup_ledger().await);
    let user = create_user(&app, "validation").await;

    // Sub-cent amount
    let response = send(
        &app,
        post_json(
            "/api/v1/deposits",
            json!({ "amount": 1.001, "user_id": user["id"] }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_amount");

    // Malformed identifier
    let response = send(&app, get("/api/v1/accounts/acct_nope/balance")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_length");

    // Zero limit
    let response = send(&app, get("/api/v1/transactions?limit=0")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_limit");

    // Invalid email
    let response = send(
        &app,
        post_json("/api/v1/users", json!({ "email": "nope", "name": "x" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_not_found_errors() {
    let (app, _) = common::test_app(common::setup_ledger().await);
    let missing = Identifier::generate(ACCOUNT_PREFIX);

    let response = send(&app, get(&format!("/api/v1/accounts/{}/balance", missing))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "account_not_found");

    let response = send(&app, get(&format!("/api/v1/accounts/{}", missing))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_account_and_duplicate_user() {
    let (app, _) = common::test_app(common::setup_ledger().await);

    let response = send(
        &app,
        post_json("/api/v1/create_account", json!({ "state": "open", "type": "credit" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let account_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = send(&app, get(&format!("/api/v1/accounts/{}", account_id))).await;
    let account = body_json(response).await;
    assert_eq!(account["state"], "open");
    assert_eq!(account["type"], "credit");

    let email = common::unique_email("dup");
    let body = json!({ "email": email, "name": "Dup" });
    assert_eq!(
        send(&app, post_json("/api/v1/users", body.clone())).await.status(),
        StatusCode::CREATED
    );
    let response = send(&app, post_json("/api/v1/users", body)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error_code"], "user_already_exists");
}
