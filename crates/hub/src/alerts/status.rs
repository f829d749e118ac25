// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delayed status alerts (C8.2). A dedicated pending-alert table, keyed by
//! rule id, absorbs system down-transitions and only fires a "down"
//! notification once the rule's `min`-minute delay has actually elapsed
//! (§4.7.2). Built on the same [`ExpiryMap`] as the universal-token cache.

use std::sync::Arc;

use crate::alerts::history;
use crate::alerts::notify::AlertMessage;
use crate::expiry_map::ExpiryMap;
use crate::hub::Hub;
use crate::model::{AlertName, AlertRule, System};

#[derive(Debug, Clone)]
struct PendingStatusAlert {
    user_id: String,
    system_id: String,
    system_name: String,
}

/// Owns the pending-status-alert table and its two tickers: the 15s sweep
/// that fires expired "down" alerts, and the ~9 minute reconciliation pass
/// that catches any rule left `triggered` whose system already recovered.
pub struct StatusAlertWorker {
    pending: Arc<ExpiryMap<PendingStatusAlert>>,
}

impl Default for StatusAlertWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusAlertWorker {
    pub fn new() -> Self {
        Self { pending: Arc::new(ExpiryMap::new()) }
    }

    /// System just transitioned to `down`: schedule a delayed "down" for
    /// every Status rule on it that isn't already pending.
    pub async fn on_system_down(&self, hub: &Hub, system: &System) -> anyhow::Result<()> {
        let rules = hub.store.list_alert_rules_for_system(&system.id).await?;
        for rule in rules.into_iter().filter(|r| r.name == AlertName::Status) {
            if self.pending.get_ok(&rule.id).await.is_some() {
                continue;
            }
            let min = rule.min.clamp(1, 60);
            self.pending
                .set(
                    rule.id.clone(),
                    PendingStatusAlert {
                        user_id: rule.user_id.clone(),
                        system_id: system.id.clone(),
                        system_name: system.name.clone(),
                    },
                    std::time::Duration::from_secs(min as u64 * 60),
                )
                .await;
        }
        Ok(())
    }

    /// System just transitioned to `up`: cancel any still-pending Status
    /// rule (no "down" was ever sent, so no "up" either), and resolve any
    /// rule that had already fired — unless it was manually dismissed
    /// (§4.7.2 "manual dismissal").
    pub async fn on_system_up(&self, hub: &Hub, system: &System) -> anyhow::Result<()> {
        let rules = hub.store.list_alert_rules_for_system(&system.id).await?;
        for rule in rules.into_iter().filter(|r| r.name == AlertName::Status) {
            if self.pending.remove(&rule.id).await.is_some() {
                continue;
            }
            if rule.triggered {
                resolve_up(hub, system, &rule).await?;
            }
        }
        Ok(())
    }

    /// Spawn the 15s pending-table sweep (§4.7.2).
    pub fn spawn_sweep(self_: Arc<Self>, hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
        let interval = hub.config.status_sweep_interval();
        let shutdown = hub.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for (rule_id, pending) in self_.pending.take_expired().await {
                            if let Err(err) = fire_down(&hub, &rule_id, &pending).await {
                                tracing::warn!(%rule_id, %err, "failed to fire status-down alert");
                            }
                        }
                    }
                }
            }
        })
    }

    /// Spawn the ~9 minute reconciliation sweep (§4.7.2 "guards against lost transitions").
    pub fn spawn_reconciliation(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
        let interval = hub.config.status_reconcile_interval();
        let shutdown = hub.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = reconcile(&hub).await {
                            tracing::warn!(%err, "status-alert reconciliation sweep failed");
                        }
                    }
                }
            }
        })
    }
}

async fn fire_down(hub: &Hub, rule_id: &str, pending: &PendingStatusAlert) -> anyhow::Result<()> {
    let rules = hub.store.list_alert_rules_by_name(AlertName::Status).await?;
    let Some(mut rule) = rules.into_iter().find(|r| r.id == rule_id) else {
        return Ok(());
    };
    rule.triggered = true;
    rule.updated = crate::model::epoch_ms();
    hub.store.update_alert_rule(rule.clone()).await?;
    history::record_trigger(hub.store.as_ref(), &rule.id, &rule.user_id, &pending.system_id, "Status", 0.0)
        .await?;
    hub.notifier
        .notify(AlertMessage {
            user_id: rule.user_id,
            system_id: pending.system_id.clone(),
            title: format!("{} is down", pending.system_name),
            body: format!("{} has not reported in over {} minute(s).", pending.system_name, rule.min),
            link: None,
            link_text: None,
        })
        .await
}

async fn resolve_up(hub: &Hub, system: &System, rule: &AlertRule) -> anyhow::Result<()> {
    let mut updated = rule.clone();
    updated.triggered = false;
    updated.updated = crate::model::epoch_ms();
    hub.store.update_alert_rule(updated).await?;
    history::record_resolve(hub.store.as_ref(), &rule.id).await?;
    hub.notifier
        .notify(AlertMessage {
            user_id: rule.user_id.clone(),
            system_id: system.id.clone(),
            title: format!("{} is up", system.name),
            body: format!("{} is back online.", system.name),
            link: None,
            link_text: None,
        })
        .await
}

async fn reconcile(hub: &Hub) -> anyhow::Result<()> {
    let rules = hub.store.list_alert_rules_by_name(AlertName::Status).await?;
    for rule in rules.into_iter().filter(|r| r.triggered) {
        let Some(system) = hub.store.get_system(&rule.system_id).await? else {
            continue;
        };
        if system.status == crate::model::SystemStatus::Up {
            resolve_up(hub, &system, &rule).await?;
        }
    }
    Ok(())
}
