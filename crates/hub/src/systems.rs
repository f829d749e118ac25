// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System manager (C6): the process-wide systems registry, the inbound
//! push path, and the outbound-polling scheduler. **[GROUNDED]** on the
//! tick-loop shape of the teacher's background pollers — a ticker fires,
//! a snapshot of candidates is taken before any `.await`, and each
//! candidate's update runs as its own concurrent task serialized by a
//! per-system lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::agent::session::AgentSession;
use crate::agent::transport::{PollTransport, UnimplementedPollTransport};
use crate::alerts::engine;
use crate::hub::Hub;
use crate::model::{
    epoch_ms, ContainerStats, ContainerStatsRow, FingerprintBinding, System, SystemStats,
    SystemStatsRow, SystemStatus, StatsTier,
};
use crate::store::Store;

/// Registry of live agent sessions plus the per-system update locks that
/// keep "at most one in-flight update per system" true for both push and
/// poll paths (§4.5).
pub struct SystemManager {
    sessions: RwLock<HashMap<String, Arc<AgentSession>>>,
    update_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for SystemManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemManager {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()), update_locks: RwLock::new(HashMap::new()) }
    }

    pub async fn register_session(&self, system_id: String, session: Arc<AgentSession>) {
        self.sessions.write().await.insert(system_id, session);
    }

    pub async fn deregister_session(&self, system_id: &str) {
        self.sessions.write().await.remove(system_id);
    }

    pub async fn has_session(&self, system_id: &str) -> bool {
        self.sessions.read().await.contains_key(system_id)
    }

    pub async fn session(&self, system_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.read().await.get(system_id).cloned()
    }

    async fn lock_update(&self, system_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.update_locks.write().await;
            Arc::clone(
                locks.entry(system_id.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// Tagged stats-push payload an agent sends unsolicited over its session
/// (§4.4 "Agent pushes are limited to stats snapshots tagged with schema version").
#[derive(Debug, Deserialize)]
struct StatsPush {
    #[serde(default)]
    #[allow(dead_code)]
    schema: u32,
    stats: SystemStats,
    #[serde(default)]
    containers: Option<Vec<ContainerStats>>,
}

/// Token → system resolution (§4.3.1).
pub async fn resolve_binding(
    store: &dyn Store,
    token: &str,
    fingerprint: &str,
    universal_user: Option<&str>,
    name_hint: String,
    client_ip: String,
    port: u16,
) -> anyhow::Result<System> {
    let records: Vec<FingerprintBinding> = store.list_bindings_for_token(token).await?;

    if records.is_empty() {
        let Some(owner) = universal_user else {
            anyhow::bail!("no matching fingerprints");
        };
        let system = store.create_system(&name_hint, &client_ip, port, owner).await?;
        store.create_binding(&system.id, token, fingerprint).await?;
        return Ok(system);
    }

    if records.len() == 1 && universal_user.is_none() {
        let binding = &records[0];
        if binding.fingerprint.is_empty() {
            store.set_binding_fingerprint(&binding.id, fingerprint).await?;
        } else if binding.fingerprint != fingerprint {
            anyhow::bail!("fingerprint mismatch");
        }
        return store
            .get_system(&binding.system_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("system for binding not found"));
    }

    // |records| > 1, or a universal token is in play.
    if let Some(matching) = records.iter().find(|b| b.fingerprint == fingerprint) {
        return store
            .get_system(&matching.system_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("system for binding not found"));
    }

    if let Some(owner) = universal_user {
        let system = store.create_system(&name_hint, &client_ip, port, owner).await?;
        store.create_binding(&system.id, token, fingerprint).await?;
        return Ok(system);
    }

    anyhow::bail!("fingerprint mismatch")
}

/// Dispatch an unsolicited agent push (§4.5 "inbound WebSocket mode the
/// agent drives cadence").
pub async fn handle_push(hub: Arc<Hub>, system_id: String, value: serde_json::Value) {
    let _guard = hub.systems.lock_update(&system_id).await;
    let push: StatsPush = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(%err, "malformed stats push");
            return;
        }
    };
    let system = match hub.store.get_system(&system_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(%err, "failed to load system for push");
            return;
        }
    };
    if let Err(err) = apply_snapshot(&hub, system, push.stats, push.containers).await {
        tracing::warn!(%err, "failed to apply pushed snapshot");
    }
}

/// Write the immutable stats rows, flip status to `up`, persist `info`,
/// bump `last_updated`, and evaluate alerts (§4.5 last paragraph, §4.7.1/§4.7.4).
async fn apply_snapshot(
    hub: &Hub,
    mut system: System,
    stats: SystemStats,
    containers: Option<Vec<ContainerStats>>,
) -> anyhow::Result<()> {
    let now = epoch_ms();
    let stats_value = serde_json::to_value(&stats)?;
    hub.store
        .insert_system_stats(SystemStatsRow {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system.id.clone(),
            created: now,
            tier: StatsTier::OneMin,
            stats: stats_value,
        })
        .await?;

    if let Some(containers) = &containers {
        let containers_value = serde_json::to_value(containers)?;
        hub.store
            .insert_container_stats(ContainerStatsRow {
                id: uuid::Uuid::new_v4().to_string(),
                system_id: system.id.clone(),
                created: now,
                tier: StatsTier::OneMin,
                containers: containers_value,
            })
            .await?;
    }

    let was_recovering = matches!(system.status, SystemStatus::Down | SystemStatus::Pending);
    system.status = SystemStatus::Up;
    system.info = serde_json::to_value(&stats).unwrap_or(serde_json::Value::Null);
    system.last_updated = now;
    system.consecutive_failures = 0;
    system.updated = now;
    hub.store.update_system(system.clone()).await?;

    if was_recovering {
        hub.status_alerts.on_system_up(hub, &system).await?;
    }

    engine::handle_system_alerts(hub, &system, &stats).await?;
    if let Some(containers) = &containers {
        engine::handle_container_alerts(hub, &system, containers).await?;
    }
    Ok(())
}

/// Record one failed poll attempt and transition to `down` only once
/// `consecutive_failures` reaches `config.down_after_failures` (§4.5 "N
/// consecutive failures or timeout"). A system already `down` just has its
/// `updated` bumped; the counter has already done its job.
async fn record_poll_failure(hub: &Hub, system: &mut System) -> anyhow::Result<()> {
    if system.status == SystemStatus::Down {
        return Ok(());
    }
    system.consecutive_failures += 1;
    system.updated = epoch_ms();
    if system.consecutive_failures >= hub.config.down_after_failures {
        system.status = SystemStatus::Down;
        system.consecutive_failures = 0;
        hub.store.update_system(system.clone()).await?;
        return hub.status_alerts.on_system_down(hub, system).await;
    }
    hub.store.update_system(system.clone()).await
}

/// Spawn the 15s outbound-polling scheduler (§4.5 "Scheduling policy").
pub fn spawn_poll_scheduler(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    let interval = hub.config.poll_tick_interval();
    let shutdown = hub.shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = run_poll_tick(&hub).await {
                        tracing::warn!(%err, "poll tick failed");
                    }
                }
            }
        }
    })
}

const RECENCY_CUTOFF_MS: u64 = 50_000;

async fn run_poll_tick(hub: &Arc<Hub>) -> anyhow::Result<()> {
    let mut candidates = Vec::new();
    for system in hub.store.list_pollable_systems().await? {
        if !hub.systems.has_session(&system.id).await {
            candidates.push(system);
        }
    }

    // ceil(N/4) + 1, per §4.5.
    let quota = candidates.len().saturating_add(3) / 4 + 1;
    let now = epoch_ms();
    let mut counted = 0usize;
    let mut tasks = Vec::new();

    for system in candidates {
        if now.saturating_sub(system.last_updated) < RECENCY_CUTOFF_MS {
            break; // ordered by ascending last_updated: nothing after this is due either.
        }
        let is_down = system.status == SystemStatus::Down;
        if !is_down {
            if counted >= quota {
                break;
            }
            counted += 1;
        }
        let hub = Arc::clone(hub);
        tasks.push(tokio::spawn(async move { poll_one(hub, system).await }));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn poll_one(hub: Arc<Hub>, mut system: System) {
    let _guard = hub.systems.lock_update(&system.id).await;
    let transport = UnimplementedPollTransport;
    let dial_timeout = hub.config.ssh_dial_timeout();

    // §9 open question: one retry of a closed polling task before bubbling.
    let mut outcome = poll_once(&transport, &system, dial_timeout).await;
    if outcome.is_err() {
        outcome = poll_once(&transport, &system, dial_timeout).await;
    }

    match outcome {
        Ok((stats, containers)) => {
            if let Err(err) = apply_snapshot(&hub, system, stats, Some(containers)).await {
                tracing::warn!(%err, "failed to apply polled snapshot");
            }
        }
        Err(err) => {
            tracing::debug!(system_id = %system.id, %err, "poll attempt failed");
            if let Err(err) = record_poll_failure(&hub, &mut system).await {
                tracing::warn!(%err, "failed to record poll failure");
            }
        }
    }
}

async fn poll_once(
    transport: &dyn PollTransport,
    system: &System,
    dial_timeout: std::time::Duration,
) -> anyhow::Result<(SystemStats, Vec<ContainerStats>)> {
    tokio::time::timeout(dial_timeout, transport.fetch(&system.host, system.port))
        .await
        .map_err(|_| anyhow::anyhow!("ssh dial timed out"))?
}

#[cfg(test)]
#[path = "systems_tests.rs"]
mod tests;
