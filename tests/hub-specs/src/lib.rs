// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end hub scenarios.
//!
//! Unlike the crate's own `#[cfg(test)]` modules (which exercise single
//! functions against a `MemoryStore`), this harness drives the hub the way
//! an agent or an operator actually would: a real in-process `axum::serve`
//! listener, a real WebSocket handshake over `tokio-tungstenite`, and real
//! HTTP requests via `axum_test::TestServer` for the plain JSON endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::signature::{UnparsedPublicKey, ED25519};
use tokio_util::sync::CancellationToken;

use beszel_hub::alerts::notify::Notifier;
use beszel_hub::config::HubConfig;
use beszel_hub::hub::Hub;
use beszel_hub::keys::KeyStore;
use beszel_hub::store::memory::MemoryStore;
use beszel_hub::store::Store;

/// A `HubConfig` with short background-loop intervals and an isolated,
/// auto-cleaned data directory. Fields are all public on `HubConfig`, so no
/// CLI parsing is needed to build one directly.
pub fn test_config() -> (HubConfig, tempfile::TempDir) {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let config = HubConfig {
        host: "127.0.0.1".into(),
        port: 0,
        data_dir: data_dir.path().to_path_buf(),
        app_url: None,
        disable_password_auth: false,
        user_creation: "admin".into(),
        mfa_otp: None,
        share_all_systems: false,
        auto_login: false,
        trusted_auth_header: None,
        csp: None,
        container_details: None,
        poll_tick_ms: 15_000,
        rollup_ms: 600_000,
        retention_ms: 3_600_000,
        status_sweep_ms: 15_000,
        status_reconcile_ms: 540_000,
        request_timeout_ms: 5_000,
        universal_token_ttl_ms: 3_600_000,
        ssh_dial_timeout_ms: 5_000,
        down_after_failures: 3,
    };
    (config, data_dir)
}

/// A fully wired `Hub` over a fresh `MemoryStore`, plus the concrete store
/// handle for asserting on persisted state directly.
pub struct TestHub {
    pub hub: Arc<Hub>,
    pub store: Arc<MemoryStore>,
    _data_dir: tempfile::TempDir,
}

impl TestHub {
    pub fn new() -> Self {
        let (config, data_dir) = test_config();
        let keys = KeyStore::load_or_generate(&config.data_dir).expect("keypair");
        let store = Arc::new(MemoryStore::new());
        let store_dyn: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let notifier = Notifier::new(Arc::clone(&store_dyn));
        let hub = Hub::new(config, store_dyn, keys, notifier, CancellationToken::new());
        Self { hub, store, _data_dir: data_dir }
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind a real TCP listener and serve `hub`'s router on it, returning the
/// bound address. The server task is aborted when the returned handle is
/// dropped, rather than waiting on `hub.shutdown` — scenario tests don't
/// need a graceful drain.
pub async fn spawn_server(hub: Arc<Hub>) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = beszel_hub::api::build_router(hub);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    Ok((addr, handle))
}

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Open the agent-connect WebSocket against `addr` with the given
/// `X-Token`/`X-Beszel` headers. Returns `Err` if the server rejected the
/// upgrade (bad headers, unknown token) before ever reaching the socket.
pub async fn connect_agent(addr: SocketAddr, token: &str, agent_version: &str) -> anyhow::Result<WsStream> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let url = format!("ws://{addr}/api/beszel/agent-connect");
    let mut request = url.into_client_request()?;
    request.headers_mut().insert("x-token", token.parse()?);
    request.headers_mut().insert("x-beszel", agent_version.parse()?);

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// Read one text frame as JSON, failing the test after `timeout`.
pub async fn recv_json(
    stream: &mut WsStream,
    timeout: std::time::Duration,
) -> anyhow::Result<serde_json::Value> {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;

    let msg = tokio::time::timeout(timeout, stream.next())
        .await
        .map_err(|_| anyhow::anyhow!("ws recv timed out"))?
        .ok_or_else(|| anyhow::anyhow!("ws stream closed before a frame arrived"))??;
    match msg {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected a text frame, got {other:?}"),
    }
}

pub async fn send_json(stream: &mut WsStream, value: &serde_json::Value) -> anyhow::Result<()> {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    stream.send(Message::Text(serde_json::to_string(value)?.into())).await?;
    Ok(())
}

/// Pull the raw 32-byte Ed25519 public key out of an OpenSSH-format blob
/// (`ssh-ed25519 <base64> <comment>`), mirroring what a real agent does
/// with the key it pinned at install time.
pub fn extract_raw_pubkey(openssh: &str) -> anyhow::Result<Vec<u8>> {
    let b64 = openssh.split(' ').nth(1).ok_or_else(|| anyhow::anyhow!("malformed openssh key"))?;
    let blob = BASE64.decode(b64)?;
    let type_len = u32::from_be_bytes(blob[0..4].try_into()?) as usize;
    let key_len_start = 4 + type_len;
    let key_len = u32::from_be_bytes(blob[key_len_start..key_len_start + 4].try_into()?) as usize;
    let key_start = key_len_start + 4;
    Ok(blob[key_start..key_start + key_len].to_vec())
}

/// Verify a hub-signed nonce challenge against its advertised public key,
/// the same check a real agent performs before trusting `GetFingerprint`.
pub fn verify_challenge(public_key_openssh: &str, challenge: &serde_json::Value) -> anyhow::Result<()> {
    let nonce = BASE64.decode(challenge["nonce"].as_str().ok_or_else(|| anyhow::anyhow!("missing nonce"))?)?;
    let signature =
        BASE64.decode(challenge["signature"].as_str().ok_or_else(|| anyhow::anyhow!("missing signature"))?)?;
    let raw_pubkey = extract_raw_pubkey(public_key_openssh)?;
    let public_key = UnparsedPublicKey::new(&ED25519, raw_pubkey);
    public_key.verify(&nonce, &signature).map_err(|_| anyhow::anyhow!("signature verification failed"))
}

/// A fully populated `SystemStats` JSON body (every non-defaulted scalar
/// filled in) so push-path tests don't need to hand-assemble one field at a
/// time.
pub fn sample_stats_json(cpu: f64) -> serde_json::Value {
    serde_json::json!({
        "cpu": cpu,
        "max_cpu": cpu,
        "mem_pct": 40.0,
        "max_mem_pct": 40.0,
        "disk_pct": 30.0,
        "max_disk_pct": 30.0,
        "load_avg1": 0.5,
        "load_avg5": 0.4,
        "load_avg15": 0.3,
        "swap_pct": 0.0,
        "max_swap_pct": 0.0,
        "battery_pct": null,
        "net_sent_bytes": 1000,
        "net_recv_bytes": 2000,
    })
}
