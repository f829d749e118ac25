// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;

use super::*;

fn new_session() -> (Arc<AgentSession>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AgentSession::new("sys1".into(), "fp1".into(), tx), rx)
}

#[tokio::test]
async fn request_resolves_when_response_echoes_the_same_id() {
    let (session, mut rx) = new_session();
    let session2 = Arc::clone(&session);

    let responder = tokio::spawn(async move {
        let Message::Text(sent) = rx.recv().await.expect("request frame sent") else {
            panic!("expected a text frame");
        };
        let sent: Value = serde_json::from_str(&sent).unwrap();
        let id = sent["id"].as_str().unwrap().to_owned();
        let response = serde_json::json!({ "id": id, "fingerprint": "fp1" });
        session2.handle_incoming(response, |_| panic!("not a push")).await;
    });

    let result = session.request("GetFingerprint", serde_json::json!({}), Duration::from_secs(1)).await;
    responder.await.unwrap();
    assert_eq!(result.unwrap()["fingerprint"], "fp1");
}

#[tokio::test]
async fn request_times_out_when_nothing_responds() {
    let (session, _rx) = new_session();
    let result = session.request("GetData", serde_json::json!({}), Duration::from_millis(10)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn unsolicited_frame_without_matching_id_is_treated_as_a_push() {
    let (session, _rx) = new_session();
    let mut pushed = None;
    session
        .handle_incoming(serde_json::json!({"stats": {"cpu": 10.0}}), |v| pushed = Some(v))
        .await;
    assert!(pushed.is_some());
}

#[tokio::test]
async fn cancel_all_fails_every_pending_request() {
    let (session, _rx) = new_session();
    let session2 = Arc::clone(&session);
    let handle = tokio::spawn(async move {
        session2.request("GetData", serde_json::json!({}), Duration::from_secs(5)).await
    });
    // Give the request a moment to register itself in `pending`.
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.cancel_all().await;
    let result = handle.await.unwrap();
    assert!(result.is_err());
}
