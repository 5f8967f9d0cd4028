//! Dunning HTTP integration tests.
//!
//! Run with: `cargo test -p strongbox-api --test dunning_api_test`

mod helpers;

use std::sync::atomic::Ordering;

use helpers::{bearer, setup_test_app, subscriber_token, TEST_CRON_SECRET};
use serde_json::json;
use strongbox_core::models::SubscriptionPlan;
use uuid::Uuid;

#[tokio::test]
async fn test_health_is_public() {
    let app = setup_test_app();

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), 200);
    let data: serde_json::Value = response.json();
    assert_eq!(data["status"], "alive");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = setup_test_app();

    let response = app.client().get("/api/openapi.json").await;

    assert_eq!(response.status_code(), 200);
    let data: serde_json::Value = response.json();
    assert!(data["paths"]["/dunning/run"].is_object());
}

#[tokio::test]
async fn test_run_requires_cron_secret() {
    let app = setup_test_app();
    let client = app.client();

    let missing = client.post("/dunning/run").await;
    assert_eq!(missing.status_code(), 401);
    let data: serde_json::Value = missing.json();
    assert_eq!(data["code"], "UNAUTHORIZED");

    let wrong = client
        .post("/dunning/run")
        .add_header("Authorization", bearer("not-the-secret"))
        .await;
    assert_eq!(wrong.status_code(), 401);

    // A subscriber token is not a cron secret
    let token = subscriber_token(Uuid::new_v4());
    let subscriber = client
        .post("/dunning/run")
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(subscriber.status_code(), 401);
}

#[tokio::test]
async fn test_run_returns_summary() {
    let app = setup_test_app();
    app.add_subscriber(SubscriptionPlan::Starter, Some(4));
    app.add_subscriber(SubscriptionPlan::Starter, Some(1));

    let response = app
        .client()
        .post("/dunning/run")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: serde_json::Value = response.json();
    assert_eq!(data, json!({ "processed": 1, "recovered": 0, "errors": 0 }));
}

#[tokio::test]
async fn test_start_is_idempotent_over_http() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Professional, None);
    let client = app.client();

    let first = client
        .post("/dunning/start")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": id, "reason": "card_declined" }))
        .await;
    assert_eq!(first.status_code(), 200);
    assert_eq!(first.json::<serde_json::Value>()["started"], true);

    let second = client
        .post("/dunning/start")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": id }))
        .await;
    assert_eq!(second.status_code(), 200);
    assert_eq!(second.json::<serde_json::Value>()["started"], false);

    assert_eq!(app.subscriptions.get_row(id).dunning_step(), 1);
}

#[tokio::test]
async fn test_start_validates_body() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Starter, None);
    let client = app.client();

    let long_reason = client
        .post("/dunning/start")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": id, "reason": "x".repeat(501) }))
        .await;
    assert_eq!(long_reason.status_code(), 400);
    assert_eq!(
        long_reason.json::<serde_json::Value>()["code"],
        "INVALID_INPUT"
    );

    let bad_id = client
        .post("/dunning/start")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": 42 }))
        .await;
    assert_eq!(bad_id.status_code(), 400);

    let unknown = client
        .post("/dunning/start")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": Uuid::new_v4() }))
        .await;
    assert_eq!(unknown.status_code(), 404);
}

#[tokio::test]
async fn test_status_requires_subscriber_token() {
    let app = setup_test_app();

    let response = app.client().get("/dunning/status").await;
    assert_eq!(response.status_code(), 401);

    let response = app
        .client()
        .get("/dunning/status")
        .add_header("Authorization", bearer("garbage.token.value"))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_status_reports_callers_dunning_state() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Starter, Some(2));

    let response = app
        .client()
        .get("/dunning/status")
        .add_header("Authorization", bearer(&subscriber_token(id)))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: serde_json::Value = response.json();
    assert_eq!(data["inDunning"], true);
    assert_eq!(data["paymentStatus"], "past_due");
    assert_eq!(data["dunningStep"], 1);
    assert!(data["paymentFailedAt"].is_string());
    assert!(data["restrictedAt"].is_null());
    assert!(data["deletionDate"].is_null());
    assert!(data["previousPlan"].is_null());
}

#[tokio::test]
async fn test_history_is_scoped_and_limited() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Starter, None);
    let other = app.add_subscriber(SubscriptionPlan::Starter, None);
    let client = app.client();

    for subscriber in [id, other] {
        client
            .post("/dunning/start")
            .add_header("Authorization", bearer(TEST_CRON_SECRET))
            .json(&json!({ "subscriberId": subscriber }))
            .await;
    }

    let token = subscriber_token(id);
    let all = client
        .get("/dunning/history")
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(all.status_code(), 200);
    let entries: Vec<serde_json::Value> = all.json();
    assert!(!entries.is_empty());
    assert!(entries
        .iter()
        .all(|e| e["subscriber_id"] == json!(id)));
    assert_eq!(entries.last().unwrap()["action"], "dunning_started");

    let limited = client
        .get("/dunning/history")
        .add_query_param("limit", 1)
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(limited.json::<Vec<serde_json::Value>>().len(), 1);

    let invalid = client
        .get("/dunning/history")
        .add_query_param("limit", "many")
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(invalid.status_code(), 400);
    assert_eq!(invalid.json::<serde_json::Value>()["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_retry_when_not_in_dunning_conflicts() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Starter, None);

    let response = app
        .client()
        .post("/dunning/retry")
        .add_header("Authorization", bearer(&subscriber_token(id)))
        .await;

    assert_eq!(response.status_code(), 409);
    let data: serde_json::Value = response.json();
    assert_eq!(data["code"], "NOT_IN_DUNNING");
}

#[tokio::test]
async fn test_retry_success_recovers_caller() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Enterprise, Some(4));
    let token = subscriber_token(id);

    let declined = app
        .client()
        .post("/dunning/retry")
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(declined.json::<serde_json::Value>()["recovered"], false);

    app.payments.succeed.store(true, Ordering::SeqCst);
    let paid = app
        .client()
        .post("/dunning/retry")
        .add_header("Authorization", bearer(&token))
        .await;
    assert_eq!(paid.status_code(), 200);
    assert_eq!(paid.json::<serde_json::Value>()["recovered"], true);
    assert!(!app.subscriptions.get_row(id).in_dunning());
}

#[tokio::test]
async fn test_recover_endpoint() {
    let app = setup_test_app();
    let id = app.add_subscriber(SubscriptionPlan::Professional, Some(10));
    let client = app.client();

    let response = client
        .post("/dunning/recover")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": id }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<serde_json::Value>()["recovered"], true);

    let again = client
        .post("/dunning/recover")
        .add_header("Authorization", bearer(TEST_CRON_SECRET))
        .json(&json!({ "subscriberId": id }))
        .await;
    assert_eq!(again.json::<serde_json::Value>()["recovered"], false);

    let row = app.subscriptions.get_row(id);
    assert_eq!(row.plan, SubscriptionPlan::Professional);
    assert_eq!(row.entitlements, app.catalog.entitlements(SubscriptionPlan::Professional));
}
