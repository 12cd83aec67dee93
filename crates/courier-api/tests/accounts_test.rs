//! Integration tests for the accounts context over HTTP.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use courier_core::context::Context;
use courier_core::storage::{Filter, Storage};
use courier_event_store::MemoryStorage;
use serde_json::json;

#[tokio::test]
async fn test_account_lifecycle_round_trip() {
    let app = common::build_test_app().await;

    // POST /api/v1/commands/account.open
    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.open",
        &json!({ "account_id": "acc-1", "owner": "ada", "initial_deposit": 100 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["aggregate_id"], "acc-1");
    assert_eq!(json["versions"], json!([1]));

    // Deposit, then withdraw
    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.deposit",
        &json!({ "account_id": "acc-1", "amount": 50 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["versions"], json!([2]));

    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.withdraw",
        &json!({ "account_id": "acc-1", "amount": 30 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["versions"], json!([3]));

    // GET /api/v1/accounts/acc-1 once deliveries have landed
    app.settle().await;
    let (status, json) = common::get_json(app.router(), "/api/v1/accounts/acc-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["owner"], "ada");
    assert_eq!(json["balance"], 120);
    assert_eq!(json["version"], 3);
    assert_eq!(json["status"], "open");
}

#[tokio::test]
async fn test_open_without_id_can_be_read_back() {
    let app = common::build_test_app().await;

    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.open",
        &json!({ "owner": "grace" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let account_id = json["aggregate_id"].as_str().unwrap().to_owned();

    app.settle().await;
    let (status, json) =
        common::get_json(app.router(), &format!("/api/v1/accounts/{account_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["owner"], "grace");
    assert_eq!(json["balance"], 0);
}

#[tokio::test]
async fn test_overdraft_is_rejected_and_nothing_is_stored() {
    let storage = Arc::new(MemoryStorage::new());
    let app = common::build_test_app_with(storage.clone()).await;
    common::post_json(
        app.router(),
        "/api/v1/commands/account.open",
        &json!({ "account_id": "acc-1", "owner": "ada", "initial_deposit": 10 }),
    )
    .await;

    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.withdraw",
        &json!({ "account_id": "acc-1", "amount": 11 }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "domain_rule_violation");
    let stream = storage
        .load(&Context::new(), &Filter::aggregate("acc-1"))
        .await
        .unwrap();
    assert_eq!(stream.len(), 1);
}

#[tokio::test]
async fn test_close_requires_empty_account() {
    let app = common::build_test_app().await;
    common::post_json(
        app.router(),
        "/api/v1/commands/account.open",
        &json!({ "account_id": "acc-1", "owner": "ada", "initial_deposit": 5 }),
    )
    .await;

    let (status, _) = common::post_json(
        app.router(),
        "/api/v1/commands/account.close",
        &json!({ "account_id": "acc-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    common::post_json(
        app.router(),
        "/api/v1/commands/account.withdraw",
        &json!({ "account_id": "acc-1", "amount": 5 }),
    )
    .await;
    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.close",
        &json!({ "account_id": "acc-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["versions"], json!([3]));

    app.settle().await;
    let (_, json) = common::get_json(app.router(), "/api/v1/accounts/acc-1").await;
    assert_eq!(json["status"], "closed");
}

#[tokio::test]
async fn test_unknown_command_returns_404() {
    let app = common::build_test_app().await;

    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/commands/account.teleport",
        &json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown_command");
}

#[tokio::test]
async fn test_unknown_account_returns_404() {
    let app = common::build_test_app().await;

    let (status, json) = common::get_json(app.router(), "/api/v1/accounts/acc-none").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "account_not_found");
}
