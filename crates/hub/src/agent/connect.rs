// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent connection manager (C4): header validation, token resolution
//! (§4.3.1), protocol upgrade, and the post-upgrade identity handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::agent::session::AgentSession;
use crate::error::HubError;
use crate::hub::Hub;
use crate::keys::generate_nonce;

const DEFAULT_AGENT_PORT: u16 = 45876;

/// `GET /api/beszel/agent-connect` — the WebSocket upgrade endpoint
/// consumed by agents (§4.9).
pub async fn agent_connect(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match read_header(&headers, "x-token").filter(|t| t.len() <= 64) {
        Some(t) => t,
        None => return HubError::BadRequest.to_http_response("missing or oversized X-Token").into_response(),
    };
    let agent_version = match read_header(&headers, "x-beszel") {
        Some(v) => v,
        None => return HubError::BadRequest.to_http_response("missing X-Beszel").into_response(),
    };
    if parse_semver(&agent_version).is_none() {
        return HubError::Unauthorized.to_http_response("invalid X-Beszel semver").into_response();
    }

    let universal_user = match hub.fingerprints.resolve_universal_user(&token).await {
        Ok(u) => u,
        Err(err) => return HubError::Internal.to_http_response(err.to_string()).into_response(),
    };
    let bindings = match hub.fingerprints.bindings_for_token(&token).await {
        Ok(b) => b,
        Err(err) => return HubError::Internal.to_http_response(err.to_string()).into_response(),
    };
    if bindings.is_empty() && universal_user.is_none() {
        return HubError::Unauthorized.to_http_response("no matching fingerprints").into_response();
    }

    let client_ip = extract_client_ip(&headers, addr);

    ws.on_upgrade(move |socket| async move {
        if let Err(err) =
            handle_socket(hub, socket, token, universal_user, client_ip, agent_version).await
        {
            tracing::warn!(%err, "agent session ended");
        }
    })
}

fn read_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_owned)
}

/// `CF-Connecting-IP` → first of `X-Forwarded-For` → remote addr minus port (§4.3.1).
pub fn extract_client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    if let Some(ip) = read_header(headers, "cf-connecting-ip") {
        return ip;
    }
    if let Some(forwarded) = read_header(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }
    remote.ip().to_string()
}

/// A minimal SemVer parser: `major.minor.patch` with an optional
/// `-prerelease`/`+build` suffix, which is all `X-Beszel` validation needs.
pub fn parse_semver(raw: &str) -> Option<(u64, u64, u64)> {
    let core = raw.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

async fn handle_socket(
    hub: Arc<Hub>,
    socket: WebSocket,
    token: String,
    universal_user: Option<String>,
    client_ip: String,
    agent_version: String,
) -> anyhow::Result<()> {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let nonce = generate_nonce();
    let signature = hub.keys.sign(&nonce);
    let challenge = serde_json::json!({
        "method": "GetFingerprint",
        "nonce": BASE64.encode(nonce),
        "signature": BASE64.encode(signature),
    });
    out_tx.send(Message::Text(serde_json::to_string(&challenge)?.into()))?;

    let timeout = hub.config.request_timeout();
    let reply = tokio::time::timeout(timeout, stream.next())
        .await
        .map_err(|_| anyhow::anyhow!("identity handshake timed out"))?
        .ok_or_else(|| anyhow::anyhow!("agent closed before identity handshake"))??;
    let Message::Text(reply) = reply else {
        anyhow::bail!("expected a text frame for the identity handshake");
    };
    let reply: serde_json::Value = serde_json::from_str(&reply)?;
    let fingerprint = reply["fingerprint"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("handshake reply missing fingerprint"))?
        .to_owned();
    let hostname = reply["hostname"].as_str().map(str::to_owned);
    let port = reply["port"].as_u64().map(|p| p as u16);
    let name = reply["name"].as_str().map(str::to_owned);

    let system = crate::systems::resolve_binding(
        hub.store.as_ref(),
        &token,
        &fingerprint,
        universal_user.as_deref(),
        name.or_else(|| hostname.clone()).unwrap_or_else(|| client_ip.clone()),
        client_ip,
        port.unwrap_or(DEFAULT_AGENT_PORT),
    )
    .await?;

    let session = AgentSession::new(system.id.clone(), fingerprint, out_tx);
    hub.systems.register_session(system.id.clone(), Arc::clone(&session)).await;
    tracing::info!(system_id = %system.id, %agent_version, "agent connected");

    // Any exit from this loop — a clean `Close` frame, the stream ending, or
    // an ungraceful read error (dropped TCP, RST) — must still run the
    // cleanup below so the session never stays registered after its socket
    // is gone. `read_err` carries a non-clean exit through to the return
    // value without short-circuiting past that cleanup.
    let mut read_err: Option<anyhow::Error> = None;
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(err) => {
                read_err = Some(err.into());
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(%err, "malformed agent frame");
                        continue;
                    }
                };
                let hub = Arc::clone(&hub);
                let system_id = system.id.clone();
                session
                    .handle_incoming(value, move |push| {
                        tokio::spawn(crate::systems::handle_push(hub, system_id, push));
                    })
                    .await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.cancel_all().await;
    hub.systems.deregister_session(&system.id).await;
    writer.abort();

    if let Some(err) = read_err {
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
#[path = "connect_tests.rs"]
mod tests;
