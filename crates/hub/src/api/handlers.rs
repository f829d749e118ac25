// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the hub's own API surface (§4.9). The agent-connect
//! WebSocket upgrade lives in [`crate::agent::connect`]; everything else —
//! bootstrap, universal tokens, user-alert CRUD, and the container/systemd/
//! SMART proxies — lives here.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::alerts::{engine, history};
use crate::api::auth::AuthUser;
use crate::error::HubError;
use crate::hub::Hub;
use crate::model::{epoch_ms, AlertName, SmartDevice, SmartState};

/// `GET /api/beszel/first-run` — unauthenticated; the installer UI polls
/// this before it has any credentials to offer.
pub async fn first_run(State(hub): State<Arc<Hub>>) -> Result<Json<Value>, HubError> {
    let count = hub.store.count_users().await.map_err(|_| HubError::Internal)?;
    Ok(Json(json!({ "firstRun": count == 0 })))
}

#[derive(Deserialize)]
pub struct CreateUserBody {
    email: String,
    password: String,
}

/// `POST /api/beszel/create-user` — only while the store has zero users
/// (§4.9); bootstraps the first superuser. Later account creation is the
/// out-of-scope auth UI's job (§1).
///
/// `body.password` is passed through to `Store::create_user` unhashed — this
/// crate implements no credential hashing (see that method's doc comment);
/// a real deployment's auth layer owns that step before users ever reach a
/// production `Store` implementation.
pub async fn create_user(
    State(hub): State<Arc<Hub>>,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<Value>, HubError> {
    if body.email.is_empty() || body.password.len() < 8 {
        return Err(HubError::BadRequest);
    }
    let count = hub.store.count_users().await.map_err(|_| HubError::Internal)?;
    if count > 0 {
        return Err(HubError::Conflict);
    }
    let user = hub
        .store
        .create_user(&body.email, &body.password, true)
        .await
        .map_err(|_| HubError::Internal)?;
    Ok(Json(json!({ "id": user.id, "email": user.email })))
}

/// `GET /api/beszel/getkey` — the hub's OpenSSH public key, handed to an
/// operator to paste into an agent's `authorized_keys`-equivalent at
/// install time (§4.2).
pub async fn get_key(State(hub): State<Arc<Hub>>, _user: AuthUser) -> Json<Value> {
    Json(json!({ "key": hub.keys.public_key_openssh(), "v": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
pub struct UniversalTokenQuery {
    token: Option<String>,
    enable: Option<String>,
}

/// `GET /api/beszel/universal-token` — create or revoke a universal
/// enrollment token scoped to the caller (§3, §4.3.1 "Universal tokens").
pub async fn universal_token(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<UniversalTokenQuery>,
) -> Result<Json<Value>, HubError> {
    if q.enable.as_deref() == Some("0") {
        let token = q.token.ok_or(HubError::BadRequest)?;
        let revoked = hub
            .fingerprints
            .revoke_universal_token(&token, &user_id)
            .await
            .map_err(|_| HubError::Internal)?;
        if !revoked {
            return Err(HubError::NotFound);
        }
        return Ok(Json(json!({ "token": token, "enabled": false })));
    }

    let token = q.token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    hub.fingerprints
        .create_universal_token(&token, &user_id)
        .await
        .map_err(|_| HubError::Internal)?;
    Ok(Json(json!({ "token": token, "enabled": true })))
}

#[derive(Deserialize)]
pub struct UpsertAlertBody {
    name: AlertName,
    value: f64,
    min: u32,
    systems: Vec<String>,
    #[serde(default)]
    overwrite: bool,
    #[serde(default)]
    filesystem: Option<String>,
}

/// `POST /api/beszel/user-alerts` — upsert one rule per listed system
/// (§4.7.1 "min clamped to [1, 60]"; `overwrite=false` is a no-op against
/// an existing rule for that system/name pair).
pub async fn upsert_user_alerts(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<UpsertAlertBody>,
) -> Result<Json<Value>, HubError> {
    if body.systems.is_empty() {
        return Err(HubError::BadRequest);
    }
    let min = body.min.clamp(1, 60);
    let mut count = 0u64;
    for system_id in &body.systems {
        let applied = hub
            .store
            .upsert_alert_rule(&user_id, system_id, body.name, body.value, min, body.filesystem.clone(), body.overwrite)
            .await
            .map_err(|_| HubError::Internal)?;
        if applied {
            count += 1;
        }
    }
    Ok(Json(json!({ "success": true, "count": count })))
}

#[derive(Deserialize)]
pub struct DeleteAlertBody {
    name: AlertName,
    systems: Vec<String>,
    #[serde(default)]
    filesystem: Option<String>,
}

/// `DELETE /api/beszel/user-alerts`. Returns a count rather than 404 when
/// nothing matched, per §7's "don't leak existence through error shape".
///
/// Resolves alert history for any matching rule that is still `triggered`
/// before deleting it (§3 "Alert-history entry", §4.8 "On delete of a
/// currently-triggered rule: same resolution as above") — deleting a rule
/// must not leave its history permanently unresolved.
pub async fn delete_user_alerts(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<DeleteAlertBody>,
) -> Result<Json<Value>, HubError> {
    let matching = hub.store.list_alert_rules_by_name(body.name).await.map_err(|_| HubError::Internal)?;
    for rule in matching.into_iter().filter(|r| {
        r.user_id == user_id
            && r.triggered
            && body.systems.contains(&r.system_id)
            && r.filesystem.as_deref() == body.filesystem.as_deref()
    }) {
        history::record_resolve(hub.store.as_ref(), &rule.id).await.map_err(|_| HubError::Internal)?;
    }

    let count = hub
        .store
        .delete_alert_rules(&user_id, body.name, &body.systems, body.filesystem.as_deref())
        .await
        .map_err(|_| HubError::Internal)?;
    Ok(Json(json!({ "success": true, "count": count })))
}

/// Load `system_id`, confirming the caller is one of its `users` (§7).
/// Unauthorized and nonexistent systems both surface as 404 — the caller
/// can't distinguish "not yours" from "doesn't exist".
async fn owned_session(
    hub: &Hub,
    user_id: &str,
    system_id: &str,
) -> Result<Arc<crate::agent::session::AgentSession>, HubError> {
    let system = hub.store.get_system(system_id).await.map_err(|_| HubError::Internal)?.ok_or(HubError::NotFound)?;
    if !system.users.iter().any(|u| u == user_id) {
        return Err(HubError::NotFound);
    }
    hub.systems.session(system_id).await.ok_or(HubError::NotFound)
}

#[derive(Deserialize)]
pub struct ContainerQuery {
    system: String,
    container: String,
}

/// `GET /api/beszel/containers/logs` — proxied straight through to the
/// live agent session; this crate does not cache container log lines.
pub async fn container_logs(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ContainerQuery>,
) -> Result<Json<Value>, HubError> {
    let session = owned_session(&hub, &user_id, &q.system).await?;
    let value = session
        .request("GetContainerLogs", json!({ "id": q.container }), hub.config.request_timeout())
        .await
        .map_err(|_| HubError::UpstreamError)?;
    Ok(Json(value))
}

/// `GET /api/beszel/containers/info` — same proxy shape, container detail.
pub async fn container_info(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ContainerQuery>,
) -> Result<Json<Value>, HubError> {
    let session = owned_session(&hub, &user_id, &q.system).await?;
    let value = session
        .request("GetContainerInfo", json!({ "id": q.container }), hub.config.request_timeout())
        .await
        .map_err(|_| HubError::UpstreamError)?;
    Ok(Json(value))
}

#[derive(Deserialize)]
pub struct SystemdQuery {
    system: String,
    name: String,
}

/// `GET /api/beszel/systemd/info` — proxied; systemd unit state is never
/// stored locally, only forwarded.
pub async fn systemd_info(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SystemdQuery>,
) -> Result<Json<Value>, HubError> {
    let session = owned_session(&hub, &user_id, &q.system).await?;
    let value = session
        .request("GetSystemdInfo", json!({ "name": q.name }), hub.config.request_timeout())
        .await
        .map_err(|_| HubError::UpstreamError)?;
    Ok(Json(value))
}

#[derive(Deserialize)]
pub struct SystemQuery {
    system: String,
}

#[derive(Deserialize)]
struct AgentSmartDevice {
    device: String,
    model: String,
    state: SmartState,
}

/// `POST /api/beszel/smart/refresh` — asks the live agent for its current
/// SMART device list, persists each device's state, and fires §4.7.3's
/// severity-escalation alert for any device that got worse.
pub async fn smart_refresh(
    State(hub): State<Arc<Hub>>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SystemQuery>,
) -> Result<Json<Value>, HubError> {
    let system = hub.store.get_system(&q.system).await.map_err(|_| HubError::Internal)?.ok_or(HubError::NotFound)?;
    if !system.users.iter().any(|u| u == &user_id) {
        return Err(HubError::NotFound);
    }
    let session = hub.systems.session(&q.system).await.ok_or(HubError::NotFound)?;
    let value = session
        .request("GetSmartDevices", json!({}), hub.config.request_timeout())
        .await
        .map_err(|_| HubError::UpstreamError)?;
    let reported: Vec<AgentSmartDevice> = serde_json::from_value(value).map_err(|_| HubError::UpstreamError)?;

    let mut devices = Vec::with_capacity(reported.len());
    for d in reported {
        let device = SmartDevice {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system.id.clone(),
            device: d.device,
            model: d.model,
            state: d.state,
            updated: epoch_ms(),
        };
        let previous = hub.store.upsert_smart_device(device.clone()).await.map_err(|_| HubError::Internal)?;
        if let Err(err) = engine::handle_smart_alert(&hub, &system, &device, previous).await {
            tracing::warn!(%err, "smart alert dispatch failed");
        }
        devices.push(device);
    }
    Ok(Json(serde_json::to_value(devices).unwrap_or(Value::Null)))
}
