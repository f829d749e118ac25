// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the hub's plain-JSON HTTP surface (§4.9).
//! Uses `axum_test::TestServer` — no real TCP needed, unlike the
//! WebSocket scenarios in `agent_connect.rs`.

use axum_test::TestServer;

use beszel_hub::api::build_router;
use beszel_hub::store::Store;
use hub_specs::TestHub;

fn test_server(test_hub: &TestHub) -> TestServer {
    let router = build_router(test_hub.hub.clone());
    TestServer::new(router).expect("failed to create test server")
}

#[tokio::test]
async fn first_run_flips_once_a_user_exists() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let resp = server.get("/api/beszel/first-run").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["firstRun"], true);

    test_hub.store.create_user("op@example.com", "hash", true).await?;

    let resp = server.get("/api/beszel/first-run").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["firstRun"], false);
    Ok(())
}

#[tokio::test]
async fn create_user_bootstraps_once_then_conflicts() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let resp = server
        .post("/api/beszel/create-user")
        .json(&serde_json::json!({"email": "op@example.com", "password": "hunter22"}))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["email"], "op@example.com");

    let second = server
        .post("/api/beszel/create-user")
        .json(&serde_json::json!({"email": "two@example.com", "password": "hunter222"}))
        .await;
    second.assert_status(axum::http::StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn create_user_rejects_a_short_password() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let resp = server
        .post("/api/beszel/create-user")
        .json(&serde_json::json!({"email": "op@example.com", "password": "short"}))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn getkey_requires_trusted_auth_header() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let unauthenticated = server.get("/api/beszel/getkey").await;
    unauthenticated.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let resp = server.get("/api/beszel/getkey").add_header("x-beszel-user", "u1").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["key"], test_hub.hub.keys.public_key_openssh());
    assert!(body["v"].as_str().is_some());
    Ok(())
}

#[tokio::test]
async fn universal_token_create_and_revoke() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let created = server
        .get("/api/beszel/universal-token")
        .add_query_param("token", "tok-a")
        .add_header("x-beszel-user", "owner")
        .await;
    created.assert_status_ok();
    let body: serde_json::Value = created.json();
    assert_eq!(body["token"], "tok-a");
    assert_eq!(body["enabled"], true);
    assert_eq!(test_hub.hub.fingerprints.resolve_universal_user("tok-a").await?, Some("owner".to_owned()));

    // A different user can't revoke someone else's token.
    let stolen = server
        .get("/api/beszel/universal-token")
        .add_query_param("token", "tok-a")
        .add_query_param("enable", "0")
        .add_header("x-beszel-user", "someone-else")
        .await;
    stolen.assert_status(axum::http::StatusCode::NOT_FOUND);

    let revoked = server
        .get("/api/beszel/universal-token")
        .add_query_param("token", "tok-a")
        .add_query_param("enable", "0")
        .add_header("x-beszel-user", "owner")
        .await;
    revoked.assert_status_ok();
    assert_eq!(revoked.json::<serde_json::Value>()["enabled"], false);
    assert_eq!(test_hub.hub.fingerprints.resolve_universal_user("tok-a").await?, None);
    Ok(())
}

#[tokio::test]
async fn revoking_a_token_that_was_never_created_is_not_found() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    let resp = server
        .get("/api/beszel/universal-token")
        .add_query_param("token", "never-existed")
        .add_query_param("enable", "0")
        .add_header("x-beszel-user", "owner")
        .await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    assert!(test_hub.store.get_universal_token("never-existed").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn upsert_user_alerts_clamps_min_and_honors_overwrite() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    let system = test_hub.store.create_system("web-1", "10.0.0.5", 45876, &user.id).await?;

    let resp = server
        .post("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Cpu", "value": 90.0, "min": 9000, "systems": [system.id]}))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["count"], 1);

    let rules = test_hub.store.list_alert_rules_for_system(&system.id).await?;
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].min, 60, "min should be clamped to 60");
    assert_eq!(rules[0].threshold, 90.0);

    // overwrite=false against an existing rule for the same system/name is a no-op.
    let noop = server
        .post("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({
            "name": "Cpu", "value": 50.0, "min": 5, "systems": [system.id], "overwrite": false
        }))
        .await;
    noop.assert_status_ok();
    assert_eq!(noop.json::<serde_json::Value>()["count"], 0);

    let rules = test_hub.store.list_alert_rules_for_system(&system.id).await?;
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].threshold, 90.0, "a no-op overwrite must not change the stored rule");
    Ok(())
}

#[tokio::test]
async fn upsert_user_alerts_rejects_an_empty_system_list() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;

    let resp = server
        .post("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Cpu", "value": 90.0, "min": 5, "systems": []}))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn delete_user_alerts_reports_a_count() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    let system = test_hub.store.create_system("web-1", "10.0.0.5", 45876, &user.id).await?;

    server
        .post("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Memory", "value": 80.0, "min": 5, "systems": [system.id]}))
        .await
        .assert_status_ok();

    let resp = server
        .delete("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Memory", "systems": [system.id]}))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["count"], 1);

    let rules = test_hub.store.list_alert_rules_for_system(&system.id).await?;
    assert!(rules.is_empty());

    // Deleting again matches nothing but still reports a clean success/count.
    let again = server
        .delete("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Memory", "systems": [system.id]}))
        .await;
    again.assert_status_ok();
    assert_eq!(again.json::<serde_json::Value>()["count"], 0);
    Ok(())
}

#[tokio::test]
async fn deleting_a_triggered_rule_resolves_its_history() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    let system = test_hub.store.create_system("web-1", "10.0.0.5", 45876, &user.id).await?;

    server
        .post("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Memory", "value": 80.0, "min": 5, "systems": [system.id]}))
        .await
        .assert_status_ok();

    let rules = test_hub.store.list_alert_rules_for_system(&system.id).await?;
    let rule = rules.into_iter().find(|r| r.name == beszel_hub::model::AlertName::Memory).expect("rule");
    let mut triggered = rule.clone();
    triggered.triggered = true;
    test_hub.store.update_alert_rule(triggered).await?;
    test_hub
        .store
        .create_alert_history(beszel_hub::model::AlertHistoryEntry {
            id: "hist-1".into(),
            alert_id: rule.id.clone(),
            user_id: user.id.clone(),
            system_id: system.id.clone(),
            name: "Memory".into(),
            value: 92.0,
            created: 1,
            resolved: None,
        })
        .await?;

    let resp = server
        .delete("/api/beszel/user-alerts")
        .add_header("x-beszel-user", user.id.as_str())
        .json(&serde_json::json!({"name": "Memory", "systems": [system.id]}))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["count"], 1);

    let history = test_hub.store.alert_history_for(&rule.id).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].resolved.is_some(), "history row must be resolved when its rule is deleted while triggered");
    Ok(())
}

#[tokio::test]
async fn protected_endpoints_require_the_trusted_auth_header() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let server = test_server(&test_hub);

    server.get("/api/beszel/universal-token").await.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    server
        .post("/api/beszel/user-alerts")
        .json(&serde_json::json!({"name": "Cpu", "value": 1.0, "min": 1, "systems": []}))
        .await
        .assert_status(axum::http::StatusCode::UNAUTHORIZED);
    server
        .delete("/api/beszel/user-alerts")
        .json(&serde_json::json!({"name": "Cpu", "systems": []}))
        .await
        .assert_status(axum::http::StatusCode::UNAUTHORIZED);
    Ok(())
}
