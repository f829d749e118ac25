// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared by the store trait and every component that reads or
//! writes it (§3). Records are kept flat — `id`/`created`/`updated` fields
//! live directly on the struct rather than behind an embedded metadata type,
//! matching the stable, straightforward-to-serialize shape the rest of this
//! crate's JSON structs already use.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds since the Unix epoch, the wire/store timestamp unit (§6).
pub type EpochMs = u64;

pub fn epoch_ms() -> EpochMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Pending,
    Up,
    Down,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// User ids with access to this system. The creator/owner is always a member.
    pub users: Vec<String>,
    pub status: SystemStatus,
    /// Last snapshot's static/slow-changing fields (os, cpu model, core count...).
    pub info: Value,
    pub last_updated: EpochMs,
    /// Consecutive failed poll attempts since the last successful snapshot;
    /// reset on success, drives the `up`/`down` transition at
    /// `config.down_after_failures` (§4.5).
    #[serde(default)]
    pub consecutive_failures: u32,
    pub created: EpochMs,
    pub updated: EpochMs,
}

/// Relates a token to a system (§3 "Fingerprint binding").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintBinding {
    pub id: String,
    pub system_id: String,
    pub token: String,
    /// Empty until the agent's first successful handshake.
    pub fingerprint: String,
    pub agent_version: Option<String>,
    pub created: EpochMs,
    pub updated: EpochMs,
}

/// In-memory (and optionally persisted) token -> user mapping (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalToken {
    pub token: String,
    pub user_id: String,
    pub enabled: bool,
    pub created: EpochMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsTier {
    #[serde(rename = "1m")]
    OneMin,
    #[serde(rename = "10m")]
    TenMin,
    #[serde(rename = "20m")]
    TwentyMin,
    #[serde(rename = "120m")]
    OneTwentyMin,
    #[serde(rename = "480m")]
    FourEightyMin,
}

impl StatsTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMin => "1m",
            Self::TenMin => "10m",
            Self::TwentyMin => "20m",
            Self::OneTwentyMin => "120m",
            Self::FourEightyMin => "480m",
        }
    }
}

/// Append-only system-stats row. The payload shape is opaque at the store
/// boundary (`serde_json::Value`) and typed (`SystemStats`) at the
/// ingestion/rollup boundary (§3 representation notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatsRow {
    pub id: String,
    pub system_id: String,
    pub created: EpochMs,
    #[serde(rename = "type")]
    pub tier: StatsTier,
    pub stats: Value,
}

/// Append-only container-stats row; payload is a list of per-container entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatsRow {
    pub id: String,
    pub system_id: String,
    pub created: EpochMs,
    #[serde(rename = "type")]
    pub tier: StatsTier,
    pub containers: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AlertName {
    Status,
    Cpu,
    Memory,
    Disk,
    Temperature,
    Bandwidth,
    LoadAvg1,
    LoadAvg5,
    LoadAvg15,
    Swap,
    Battery,
    #[serde(rename = "SMART")]
    Smart,
}

impl AlertName {
    /// Battery is the one inverted-direction rule (§4.7.1 step 6).
    pub fn is_inverted(&self) -> bool {
        matches!(self, Self::Battery)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub user_id: String,
    pub system_id: String,
    pub name: AlertName,
    pub threshold: f64,
    /// Averaging window in minutes, clamped to [1, 60] on evaluation.
    pub min: u32,
    pub filesystem: Option<String>,
    pub triggered: bool,
    pub created: EpochMs,
    pub updated: EpochMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ContainerAlertName {
    Status,
    Health,
    Network,
    Cpu,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerAlertRule {
    pub id: String,
    pub user_id: String,
    pub system_id: String,
    pub container_id: String,
    pub name: ContainerAlertName,
    pub threshold: f64,
    pub min: u32,
    pub triggered: bool,
    pub created: EpochMs,
    pub updated: EpochMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: String,
    pub alert_id: String,
    pub user_id: String,
    pub system_id: String,
    pub name: String,
    pub value: f64,
    pub created: EpochMs,
    pub resolved: Option<EpochMs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuietHoursKind {
    OneTime,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursWindow {
    pub id: String,
    pub user_id: String,
    /// Empty = global (applies to every system owned by the user).
    pub system_id: Option<String>,
    pub kind: QuietHoursKind,
    /// For `one_time`: absolute epoch-ms. For `daily`: minutes since midnight.
    pub start: EpochMs,
    pub end: EpochMs,
    pub created: EpochMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SmartState {
    Unknown = 0,
    Passed = 1,
    Warning = 2,
    Failed = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartDevice {
    pub id: String,
    pub system_id: String,
    pub device: String,
    pub model: String,
    pub state: SmartState,
    pub updated: EpochMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Opaque credential material as handed to [`crate::store::Store::create_user`].
    /// This crate never hashes or verifies it — full auth, including password
    /// hashing, is an external collaborator per §1; a real deployment's auth
    /// layer must hash before this ever reaches a persistent `Store` impl.
    pub credential: String,
    pub superuser: bool,
    pub created: EpochMs,
}

/// Per-user notification settings (§4.7.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub emails: Vec<String>,
    pub webhooks: Vec<String>,
}

/// Fully typed system-stats snapshot, used at the ingestion/rollup boundary.
/// Deserialized from a `SystemStatsRow.stats` value via `serde_json::from_value`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu: f64,
    pub max_cpu: f64,
    pub mem_pct: f64,
    pub max_mem_pct: f64,
    pub disk_pct: f64,
    pub max_disk_pct: f64,
    pub load_avg1: f64,
    pub load_avg5: f64,
    pub load_avg15: f64,
    pub swap_pct: f64,
    pub max_swap_pct: f64,
    pub battery_pct: Option<f64>,
    /// Cumulative bytes sent/received since agent start.
    pub net_sent_bytes: u64,
    pub net_recv_bytes: u64,
    /// `[tx_sum, rx_sum, tx_max, rx_max]` per NIC name.
    #[serde(default)]
    pub nics: HashMap<String, [f64; 4]>,
    #[serde(default)]
    pub temperatures: HashMap<String, f64>,
    #[serde(default)]
    pub filesystems: HashMap<String, FsStats>,
    #[serde(default)]
    pub gpus: HashMap<String, GpuStats>,
    #[serde(default)]
    pub per_core_cpu: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsStats {
    pub used_pct: f64,
    pub max_used_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuStats {
    pub temperature: f64,
    pub mem_used: f64,
    pub mem_total: f64,
    pub usage: f64,
    pub power: f64,
    #[serde(default)]
    pub engines: HashMap<String, f64>,
}

/// A single container's entry inside a `ContainerStatsRow.containers` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub net_sent_bytes: u64,
    pub net_recv_bytes: u64,
    pub health: Option<String>,
    pub uptime_secs: Option<i64>,
}
