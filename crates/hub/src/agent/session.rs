// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub-side WebSocket session (C5). **[GROUNDED]** directly on the
//! correlation-id request/response shape used for the upstream bridge:
//! stamp an id on the outgoing frame, park a oneshot sender under that id,
//! and resolve it when a frame echoing the same id arrives. The direction
//! is inverted here — the hub is the requester and a system has at most
//! one agent session, so there is no downstream-client fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

/// A live, upgraded connection to exactly one agent. Owns the correlation
/// table for outstanding hub→agent requests.
pub struct AgentSession {
    system_id: String,
    fingerprint: String,
    out_tx: mpsc::UnboundedSender<Message>,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<Value, String>>>>,
    next_id: AtomicU64,
}

impl AgentSession {
    pub fn new(
        system_id: String,
        fingerprint: String,
        out_tx: mpsc::UnboundedSender<Message>,
    ) -> Arc<Self> {
        Arc::new(Self {
            system_id,
            fingerprint,
            out_tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn next_correlation_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Send a typed request (`GetFingerprint`, `GetData`, `GetContainerLogs`,
    /// `GetContainerInfo`, `GetSystemdInfo`, `GetSmartDevices`, ...) and
    /// block the caller until its correlation id returns or `timeout` elapses.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> anyhow::Result<Value> {
        let id = self.next_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let frame = serde_json::json!({ "id": id, "method": method, "params": params });
        let text = serde_json::to_string(&frame)?;
        if self.out_tx.send(Message::Text(text.into())).is_err() {
            self.pending.lock().await.remove(&id);
            anyhow::bail!("agent session closed");
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(reason))) => anyhow::bail!("agent request {method} failed: {reason}"),
            Ok(Err(_)) => anyhow::bail!("agent session closed before responding"),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                anyhow::bail!("request {method} timed out")
            }
        }
    }

    /// Dispatch an inbound frame. If it carries a correlation id matching a
    /// pending request, resolve it; otherwise treat it as an unsolicited
    /// push (a stats snapshot) and hand it to `on_push`.
    pub async fn handle_incoming(&self, value: Value, on_push: impl FnOnce(Value)) {
        if let Some(id) = value.get("id").and_then(Value::as_str) {
            if let Some(tx) = self.pending.lock().await.remove(id) {
                let _ = tx.send(Ok(value));
                return;
            }
        }
        on_push(value);
    }

    /// Closing the session cancels every pending request with a terminal
    /// error (§4.4).
    pub async fn cancel_all(&self) {
        for (_, tx) in self.pending.lock().await.drain() {
            let _ = tx.send(Err("session closed".to_owned()));
        }
    }

    pub fn send_raw(&self, message: Message) -> anyhow::Result<()> {
        self.out_tx.send(message).map_err(|_| anyhow::anyhow!("agent session closed"))
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
