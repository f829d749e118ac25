// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `Store` implementation. Used by the test harness (C17) and,
//! for lack of a real persistent-store implementation (an external
//! collaborator this crate only sketches, per §1), by `main`'s `serve`
//! command as well — records, rules, and history do not survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::model::*;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    systems: RwLock<HashMap<String, System>>,
    bindings: RwLock<HashMap<String, FingerprintBinding>>,
    universal_tokens: RwLock<HashMap<String, UniversalToken>>,
    system_stats: RwLock<Vec<SystemStatsRow>>,
    container_stats: RwLock<Vec<ContainerStatsRow>>,
    alert_rules: RwLock<HashMap<String, AlertRule>>,
    container_alert_rules: RwLock<HashMap<String, ContainerAlertRule>>,
    smart_devices: RwLock<HashMap<(String, String), SmartDevice>>,
    quiet_hours: RwLock<HashMap<String, QuietHoursWindow>>,
    alert_history: RwLock<Vec<AlertHistoryEntry>>,
    notification_settings: RwLock<HashMap<String, NotificationSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: seed a notification destination so dispatch tests don't
    /// need to go through a settings-management endpoint that doesn't exist.
    pub async fn set_notification_settings(&self, user_id: &str, settings: NotificationSettings) {
        self.notification_settings.write().await.insert(user_id.to_owned(), settings);
    }

    /// Test helper: every alert-history row recorded for `alert_id`, in
    /// insertion order, so tests can assert on `resolved` without the
    /// `Store` trait needing a generic history-listing method.
    pub async fn alert_history_for(&self, alert_id: &str) -> Vec<AlertHistoryEntry> {
        self.alert_history.read().await.iter().filter(|h| h.alert_id == alert_id).cloned().collect()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl Store for MemoryStore {
    async fn count_users(&self) -> anyhow::Result<u64> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn create_user(&self, email: &str, credential: &str, superuser: bool) -> anyhow::Result<User> {
        let user = User {
            id: new_id(),
            email: email.to_owned(),
            credential: credential.to_owned(),
            superuser,
            created: epoch_ms(),
        };
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn create_system(
        &self,
        name: &str,
        host: &str,
        port: u16,
        owner: &str,
    ) -> anyhow::Result<System> {
        let now = epoch_ms();
        let system = System {
            id: new_id(),
            name: name.to_owned(),
            host: host.to_owned(),
            port,
            users: vec![owner.to_owned()],
            status: SystemStatus::Pending,
            info: serde_json::Value::Null,
            last_updated: now,
            consecutive_failures: 0,
            created: now,
            updated: now,
        };
        self.systems.write().await.insert(system.id.clone(), system.clone());
        Ok(system)
    }

    async fn get_system(&self, id: &str) -> anyhow::Result<Option<System>> {
        Ok(self.systems.read().await.get(id).cloned())
    }

    async fn update_system(&self, system: System) -> anyhow::Result<()> {
        self.systems.write().await.insert(system.id.clone(), system);
        Ok(())
    }

    async fn list_systems(&self) -> anyhow::Result<Vec<System>> {
        Ok(self.systems.read().await.values().cloned().collect())
    }

    async fn list_pollable_systems(&self) -> anyhow::Result<Vec<System>> {
        let mut systems: Vec<System> = self
            .systems
            .read()
            .await
            .values()
            .filter(|s| s.status != SystemStatus::Paused)
            .cloned()
            .collect();
        systems.sort_by_key(|s| s.last_updated);
        Ok(systems)
    }

    async fn delete_system(&self, id: &str) -> anyhow::Result<()> {
        self.systems.write().await.remove(id);
        self.bindings.write().await.retain(|_, b| b.system_id != id);
        self.alert_rules.write().await.retain(|_, r| r.system_id != id);
        self.container_alert_rules.write().await.retain(|_, r| r.system_id != id);
        self.smart_devices.write().await.retain(|(sys, _), _| sys != id);
        self.system_stats.write().await.retain(|r| r.system_id != id);
        self.container_stats.write().await.retain(|r| r.system_id != id);
        Ok(())
    }

    async fn list_bindings_for_token(&self, token: &str) -> anyhow::Result<Vec<FingerprintBinding>> {
        Ok(self.bindings.read().await.values().filter(|b| b.token == token).cloned().collect())
    }

    async fn create_binding(
        &self,
        system_id: &str,
        token: &str,
        fingerprint: &str,
    ) -> anyhow::Result<FingerprintBinding> {
        let now = epoch_ms();
        let binding = FingerprintBinding {
            id: new_id(),
            system_id: system_id.to_owned(),
            token: token.to_owned(),
            fingerprint: fingerprint.to_owned(),
            agent_version: None,
            created: now,
            updated: now,
        };
        self.bindings.write().await.insert(binding.id.clone(), binding.clone());
        Ok(binding)
    }

    async fn set_binding_fingerprint(&self, binding_id: &str, fingerprint: &str) -> anyhow::Result<()> {
        if let Some(binding) = self.bindings.write().await.get_mut(binding_id) {
            binding.fingerprint = fingerprint.to_owned();
            binding.updated = epoch_ms();
        }
        Ok(())
    }

    async fn get_universal_token(&self, token: &str) -> anyhow::Result<Option<UniversalToken>> {
        Ok(self.universal_tokens.read().await.get(token).cloned())
    }

    async fn put_universal_token(&self, token: UniversalToken) -> anyhow::Result<()> {
        self.universal_tokens.write().await.insert(token.token.clone(), token);
        Ok(())
    }

    async fn insert_system_stats(&self, row: SystemStatsRow) -> anyhow::Result<()> {
        self.system_stats.write().await.push(row);
        Ok(())
    }

    async fn insert_container_stats(&self, row: ContainerStatsRow) -> anyhow::Result<()> {
        self.container_stats.write().await.push(row);
        Ok(())
    }

    async fn list_system_stats_since(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<Vec<SystemStatsRow>> {
        let mut rows: Vec<SystemStatsRow> = self
            .system_stats
            .read()
            .await
            .iter()
            .filter(|r| r.system_id == system_id && r.tier == tier && r.created >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created);
        Ok(rows)
    }

    async fn list_container_stats_since(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<Vec<ContainerStatsRow>> {
        let mut rows: Vec<ContainerStatsRow> = self
            .container_stats
            .read()
            .await
            .iter()
            .filter(|r| r.system_id == system_id && r.tier == tier && r.created >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created);
        Ok(rows)
    }

    async fn has_system_stats_after(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<bool> {
        Ok(self
            .system_stats
            .read()
            .await
            .iter()
            .any(|r| r.system_id == system_id && r.tier == tier && r.created > since))
    }

    async fn has_container_stats_after(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<bool> {
        Ok(self
            .container_stats
            .read()
            .await
            .iter()
            .any(|r| r.system_id == system_id && r.tier == tier && r.created > since))
    }

    async fn delete_system_stats_older_than(&self, tier: StatsTier, cutoff: EpochMs) -> anyhow::Result<u64> {
        let mut rows = self.system_stats.write().await;
        let before = rows.len();
        rows.retain(|r| !(r.tier == tier && r.created < cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_container_stats_older_than(&self, tier: StatsTier, cutoff: EpochMs) -> anyhow::Result<u64> {
        let mut rows = self.container_stats.write().await;
        let before = rows.len();
        rows.retain(|r| !(r.tier == tier && r.created < cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn list_alert_rules_for_system(&self, system_id: &str) -> anyhow::Result<Vec<AlertRule>> {
        Ok(self.alert_rules.read().await.values().filter(|r| r.system_id == system_id).cloned().collect())
    }

    async fn list_alert_rules_by_name(&self, name: AlertName) -> anyhow::Result<Vec<AlertRule>> {
        Ok(self.alert_rules.read().await.values().filter(|r| r.name == name).cloned().collect())
    }

    async fn upsert_alert_rule(
        &self,
        user_id: &str,
        system_id: &str,
        name: AlertName,
        threshold: f64,
        min: u32,
        filesystem: Option<String>,
        overwrite: bool,
    ) -> anyhow::Result<bool> {
        let mut rules = self.alert_rules.write().await;
        let existing = rules.values_mut().find(|r| {
            r.user_id == user_id
                && r.system_id == system_id
                && r.name == name
                && r.filesystem == filesystem
        });

        match existing {
            Some(rule) if !overwrite => {
                let _ = rule;
                Ok(false)
            }
            Some(rule) => {
                rule.threshold = threshold;
                rule.min = min;
                rule.updated = epoch_ms();
                Ok(true)
            }
            None => {
                let now = epoch_ms();
                let rule = AlertRule {
                    id: new_id(),
                    user_id: user_id.to_owned(),
                    system_id: system_id.to_owned(),
                    name,
                    threshold,
                    min,
                    filesystem,
                    triggered: false,
                    created: now,
                    updated: now,
                };
                rules.insert(rule.id.clone(), rule);
                Ok(true)
            }
        }
    }

    async fn update_alert_rule(&self, rule: AlertRule) -> anyhow::Result<()> {
        self.alert_rules.write().await.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn delete_alert_rules(
        &self,
        user_id: &str,
        name: AlertName,
        systems: &[String],
        filesystem: Option<&str>,
    ) -> anyhow::Result<u64> {
        let mut rules = self.alert_rules.write().await;
        let before = rules.len();
        rules.retain(|_, r| {
            !(r.user_id == user_id
                && r.name == name
                && systems.contains(&r.system_id)
                && r.filesystem.as_deref() == filesystem)
        });
        Ok((before - rules.len()) as u64)
    }

    async fn list_container_alert_rules_for_system(
        &self,
        system_id: &str,
    ) -> anyhow::Result<Vec<ContainerAlertRule>> {
        Ok(self
            .container_alert_rules
            .read()
            .await
            .values()
            .filter(|r| r.system_id == system_id)
            .cloned()
            .collect())
    }

    async fn update_container_alert_rule(&self, rule: ContainerAlertRule) -> anyhow::Result<()> {
        self.container_alert_rules.write().await.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn upsert_smart_device(&self, device: SmartDevice) -> anyhow::Result<Option<SmartState>> {
        let key = (device.system_id.clone(), device.device.clone());
        let previous = self.smart_devices.write().await.insert(key, device).map(|d| d.state);
        Ok(previous)
    }

    async fn list_quiet_hours_for_user(&self, user_id: &str) -> anyhow::Result<Vec<QuietHoursWindow>> {
        Ok(self.quiet_hours.read().await.values().filter(|w| w.user_id == user_id).cloned().collect())
    }

    async fn delete_expired_one_time_quiet_hours(&self, now: EpochMs) -> anyhow::Result<u64> {
        let mut windows = self.quiet_hours.write().await;
        let before = windows.len();
        windows.retain(|_, w| !(w.kind == QuietHoursKind::OneTime && w.end < now));
        Ok((before - windows.len()) as u64)
    }

    async fn create_alert_history(&self, entry: AlertHistoryEntry) -> anyhow::Result<()> {
        self.alert_history.write().await.push(entry);
        Ok(())
    }

    async fn resolve_latest_unresolved_history(&self, alert_id: &str, now: EpochMs) -> anyhow::Result<()> {
        let mut history = self.alert_history.write().await;
        if let Some(entry) = history
            .iter_mut()
            .filter(|e| e.alert_id == alert_id && e.resolved.is_none())
            .max_by_key(|e| e.created)
        {
            entry.resolved = Some(now);
        }
        Ok(())
    }

    async fn prune_alert_history(&self, user_id: &str, keep: usize, threshold: usize) -> anyhow::Result<u64> {
        let mut history = self.alert_history.write().await;
        let user_count = history.iter().filter(|e| e.user_id == user_id).count();
        if user_count <= threshold {
            return Ok(0);
        }

        let mut user_rows: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, e)| e.user_id == user_id)
            .map(|(i, _)| i)
            .collect();
        user_rows.sort_by_key(|&i| std::cmp::Reverse(history[i].created));
        let to_drop: std::collections::HashSet<usize> = user_rows.into_iter().skip(keep).collect();

        let before = history.len();
        let mut kept = Vec::with_capacity(history.len());
        for (i, entry) in history.drain(..).enumerate() {
            if !to_drop.contains(&i) {
                kept.push(entry);
            }
        }
        *history = kept;
        Ok((before - history.len()) as u64)
    }

    async fn get_notification_settings(&self, user_id: &str) -> anyhow::Result<NotificationSettings> {
        Ok(self.notification_settings.read().await.get(user_id).cloned().unwrap_or_default())
    }
}
