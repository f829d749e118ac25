// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent-store boundary (C16).
//!
//! This crate treats the embedded record/collection store as an external
//! collaborator: "a black-box document database offering typed records,
//! filtered queries, transactions, hooks on create/update/delete, and
//! realtime subscriptions." `Store` is this crate's Rust-facing sketch of
//! that boundary — one method per query the rest of the hub actually needs,
//! not a generic query engine (no custom query language, per scope).
//!
//! No real backend ships here; [`memory::MemoryStore`] stands in for it,
//! used by the test harness (C17) and, absent a real implementation, by
//! `main`'s `serve` command.

pub mod memory;

use async_trait::async_trait;

use crate::model::*;

/// The document-store boundary. Every method is a point query or a narrow
/// filtered scan — the store itself owns indexing and transactional
/// discipline; callers must not assume cross-call atomicity except where a
/// method is explicitly documented as transactional.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- users ----------------------------------------------------------
    async fn count_users(&self) -> anyhow::Result<u64>;
    /// `credential` is stored verbatim — this crate does not hash or verify
    /// it. Password hashing belongs to the external auth layer (§1), which
    /// is expected to hash before calling this, the same way the browser
    /// UI/OAuth flow it fronts is itself out of scope here.
    async fn create_user(&self, email: &str, credential: &str, superuser: bool) -> anyhow::Result<User>;
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;

    // -- systems ----------------------------------------------------------
    async fn create_system(
        &self,
        name: &str,
        host: &str,
        port: u16,
        owner: &str,
    ) -> anyhow::Result<System>;
    async fn get_system(&self, id: &str) -> anyhow::Result<Option<System>>;
    async fn update_system(&self, system: System) -> anyhow::Result<()>;
    async fn list_systems(&self) -> anyhow::Result<Vec<System>>;
    /// Non-paused systems ordered by ascending `last_updated` (§4.5 scheduling).
    async fn list_pollable_systems(&self) -> anyhow::Result<Vec<System>>;
    async fn delete_system(&self, id: &str) -> anyhow::Result<()>;

    // -- fingerprint bindings ---------------------------------------------
    async fn list_bindings_for_token(&self, token: &str) -> anyhow::Result<Vec<FingerprintBinding>>;
    async fn create_binding(
        &self,
        system_id: &str,
        token: &str,
        fingerprint: &str,
    ) -> anyhow::Result<FingerprintBinding>;
    async fn set_binding_fingerprint(&self, binding_id: &str, fingerprint: &str) -> anyhow::Result<()>;

    // -- universal tokens (persistent fallback; the hot path is the
    //    in-memory expiry-map cache owned by the fingerprint registry) ----
    async fn get_universal_token(&self, token: &str) -> anyhow::Result<Option<UniversalToken>>;
    async fn put_universal_token(&self, token: UniversalToken) -> anyhow::Result<()>;

    // -- stats --------------------------------------------------------------
    async fn insert_system_stats(&self, row: SystemStatsRow) -> anyhow::Result<()>;
    async fn insert_container_stats(&self, row: ContainerStatsRow) -> anyhow::Result<()>;
    async fn list_system_stats_since(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<Vec<SystemStatsRow>>;
    async fn list_container_stats_since(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<Vec<ContainerStatsRow>>;
    /// True if a row of `tier` exists for `system_id` with `created > since`.
    async fn has_system_stats_after(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<bool>;
    /// True if a container-stats row of `tier` exists for `system_id` with `created > since`.
    async fn has_container_stats_after(
        &self,
        system_id: &str,
        tier: StatsTier,
        since: EpochMs,
    ) -> anyhow::Result<bool>;
    async fn delete_system_stats_older_than(&self, tier: StatsTier, cutoff: EpochMs) -> anyhow::Result<u64>;
    async fn delete_container_stats_older_than(&self, tier: StatsTier, cutoff: EpochMs) -> anyhow::Result<u64>;

    // -- alert rules --------------------------------------------------------
    async fn list_alert_rules_for_system(&self, system_id: &str) -> anyhow::Result<Vec<AlertRule>>;
    async fn list_alert_rules_by_name(&self, name: AlertName) -> anyhow::Result<Vec<AlertRule>>;
    async fn upsert_alert_rule(
        &self,
        user_id: &str,
        system_id: &str,
        name: AlertName,
        threshold: f64,
        min: u32,
        filesystem: Option<String>,
        overwrite: bool,
    ) -> anyhow::Result<bool>;
    async fn update_alert_rule(&self, rule: AlertRule) -> anyhow::Result<()>;
    async fn delete_alert_rules(
        &self,
        user_id: &str,
        name: AlertName,
        systems: &[String],
        filesystem: Option<&str>,
    ) -> anyhow::Result<u64>;

    async fn list_container_alert_rules_for_system(
        &self,
        system_id: &str,
    ) -> anyhow::Result<Vec<ContainerAlertRule>>;
    async fn update_container_alert_rule(&self, rule: ContainerAlertRule) -> anyhow::Result<()>;

    // -- SMART devices --------------------------------------------------------
    async fn upsert_smart_device(&self, device: SmartDevice) -> anyhow::Result<Option<SmartState>>;

    // -- quiet hours --------------------------------------------------------
    async fn list_quiet_hours_for_user(&self, user_id: &str) -> anyhow::Result<Vec<QuietHoursWindow>>;
    async fn delete_expired_one_time_quiet_hours(&self, now: EpochMs) -> anyhow::Result<u64>;

    // -- alerts history --------------------------------------------------------
    async fn create_alert_history(&self, entry: AlertHistoryEntry) -> anyhow::Result<()>;
    async fn resolve_latest_unresolved_history(&self, alert_id: &str, now: EpochMs) -> anyhow::Result<()>;
    async fn prune_alert_history(&self, user_id: &str, keep: usize, threshold: usize) -> anyhow::Result<u64>;

    // -- notification settings --------------------------------------------------------
    async fn get_notification_settings(&self, user_id: &str) -> anyhow::Result<NotificationSettings>;
}
