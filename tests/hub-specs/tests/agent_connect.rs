// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end agent-connect scenarios (spec §8 S1-S3): a real WebSocket
//! handshake against a real in-process listener, exercised the way an
//! actual agent would — verify the signed nonce, answer `GetFingerprint`,
//! then either push a stats snapshot or get dropped.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;

use beszel_hub::store::Store;
use hub_specs::{connect_agent, recv_json, sample_stats_json, send_json, spawn_server, verify_challenge, TestHub};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll the async predicate `f` until it returns `true` or `timeout` elapses.
async fn wait_until<F, Fut>(timeout: Duration, mut f: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if f().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// S1 — First-connect bind: a binding with an empty fingerprint is filled
/// in by the first agent handshake, and the system goes `up` on its first
/// pushed snapshot.
#[tokio::test]
async fn first_connect_binds_fingerprint_and_goes_up() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    let system = test_hub.store.create_system("web-1", "10.0.0.5", 45876, &user.id).await?;
    test_hub.store.create_binding(&system.id, "tok-s1", "").await?;

    let (addr, _server) = spawn_server(test_hub.hub.clone()).await?;
    let mut ws = connect_agent(addr, "tok-s1", "0.12.0").await?;

    let challenge = recv_json(&mut ws, RECV_TIMEOUT).await?;
    assert_eq!(challenge["method"], "GetFingerprint");
    verify_challenge(test_hub.hub.keys.public_key_openssh(), &challenge)?;

    send_json(&mut ws, &serde_json::json!({"fingerprint": "fp-1", "hostname": "host1", "port": null, "name": null}))
        .await?;

    let bound = wait_until(RECV_TIMEOUT, || async {
        test_hub
            .store
            .list_bindings_for_token("tok-s1")
            .await
            .map(|b| b.iter().any(|x| x.fingerprint == "fp-1"))
            .unwrap_or(false)
    })
    .await;
    assert!(bound, "fingerprint should have been bound on first connect");

    send_json(&mut ws, &serde_json::json!({"schema": 1, "stats": sample_stats_json(55.0)})).await?;

    let up = wait_until(RECV_TIMEOUT, || async {
        test_hub
            .store
            .get_system(&system.id)
            .await
            .ok()
            .flatten()
            .map(|s| s.status == beszel_hub::model::SystemStatus::Up)
            .unwrap_or(false)
    })
    .await;
    assert!(up, "system should be up after its first pushed snapshot");

    let rows = test_hub.store.list_system_stats_since(&system.id, beszel_hub::model::StatsTier::OneMin, 0).await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

/// S2 — Mismatch rejection: a bound, non-empty fingerprint rejects any
/// other fingerprint. The binding is left untouched and no system is created.
#[tokio::test]
async fn fingerprint_mismatch_is_rejected_without_mutating_state() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    let system = test_hub.store.create_system("web-2", "10.0.0.6", 45876, &user.id).await?;
    test_hub.store.create_binding(&system.id, "tok-s2", "fp-1").await?;

    let (addr, _server) = spawn_server(test_hub.hub.clone()).await?;
    let mut ws = connect_agent(addr, "tok-s2", "0.12.0").await?;

    let challenge = recv_json(&mut ws, RECV_TIMEOUT).await?;
    verify_challenge(test_hub.hub.keys.public_key_openssh(), &challenge)?;

    send_json(&mut ws, &serde_json::json!({"fingerprint": "fp-wrong", "hostname": "host1", "port": null, "name": null}))
        .await?;

    // The hub closes the session on mismatch rather than answering a push;
    // the next frame read should end the stream rather than deliver one.
    let next = tokio::time::timeout(RECV_TIMEOUT, ws.next()).await?;
    assert!(next.is_none() || next.unwrap().is_err(), "mismatched fingerprint should close the session");

    let bindings = test_hub.store.list_bindings_for_token("tok-s2").await?;
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].fingerprint, "fp-1", "binding must be left untouched on mismatch");
    assert_eq!(test_hub.store.list_systems().await?.len(), 1, "no new system should be created");
    Ok(())
}

/// S3 — Universal enroll: a fresh fingerprint arriving with an active
/// universal token auto-creates exactly one system owned by the token's user.
#[tokio::test]
async fn universal_token_creates_a_new_system() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let user = test_hub.store.create_user("op@example.com", "hash", true).await?;
    test_hub.hub.fingerprints.create_universal_token("tok-universal", &user.id).await?;

    let (addr, _server) = spawn_server(test_hub.hub.clone()).await?;
    let mut ws = connect_agent(addr, "tok-universal", "0.12.0").await?;

    let challenge = recv_json(&mut ws, RECV_TIMEOUT).await?;
    verify_challenge(test_hub.hub.keys.public_key_openssh(), &challenge)?;

    send_json(&mut ws, &serde_json::json!({"fingerprint": "fp-pi", "hostname": "pi.lan", "port": null, "name": null}))
        .await?;

    let created = wait_until(RECV_TIMEOUT, || async { test_hub.store.list_systems().await.map(|s| s.len() == 1).unwrap_or(false) })
        .await;
    assert!(created, "a new system should have been created");

    let systems = test_hub.store.list_systems().await?;
    let system = &systems[0];
    assert_eq!(system.name, "pi.lan");
    assert_eq!(system.port, 45876);
    assert_eq!(system.users, vec![user.id.clone()]);
    assert!(
        system.host == "127.0.0.1" || system.host == "::1",
        "host should be the client's loopback address, got {}",
        system.host
    );

    let bindings = test_hub.store.list_bindings_for_token("tok-universal").await?;
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].fingerprint, "fp-pi");
    Ok(())
}

/// Bad headers are rejected before any upgrade — no session, no state change.
#[tokio::test]
async fn oversized_token_header_is_rejected() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let (addr, _server) = spawn_server(test_hub.hub.clone()).await?;

    let oversized = "x".repeat(65);
    let result = connect_agent(addr, &oversized, "0.12.0").await;
    assert!(result.is_err(), "an oversized X-Token should fail the upgrade");
    Ok(())
}

#[tokio::test]
async fn unknown_token_with_no_bindings_is_rejected() -> anyhow::Result<()> {
    let test_hub = TestHub::new();
    let (addr, _server) = spawn_server(test_hub.hub.clone()).await?;

    let result = connect_agent(addr, "never-seen-token", "0.12.0").await;
    assert!(result.is_err(), "an unrecognized token should fail the upgrade");
    Ok(())
}
