// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Threshold, SMART, and container alert evaluation (C8.1, C8.3, C8.4).
//! Status alerts are handled separately by [`crate::alerts::status`] since
//! they fire on a delay rather than an averaging window.
//!
//! **[GROUNDED]** on `other_examples`' `AlertManager` evaluate/fire/resolve
//! skeleton, adapted to this spec's averaging-window and direction rules,
//! which differ substantively from that reference's instantaneous compare.

use std::collections::HashMap;

use crate::alerts::history;
use crate::alerts::notify::AlertMessage;
use crate::hub::Hub;
use crate::model::{
    epoch_ms, AlertName, AlertRule, ContainerAlertName, ContainerAlertRule, ContainerStats,
    EpochMs, SmartDevice, SmartState, StatsTier, System, SystemStats,
};

/// Entry point called after each fresh system-stats write (§4.7.1).
pub async fn handle_system_alerts(hub: &Hub, system: &System, stats: &SystemStats) -> anyhow::Result<()> {
    let rules = hub.store.list_alert_rules_for_system(&system.id).await?;
    let now = epoch_ms();

    let mut instantaneous = Vec::new();
    let mut averaged: Vec<(AlertRule, EpochMs)> = Vec::new();
    for rule in rules {
        if matches!(rule.name, AlertName::Status | AlertName::Smart) {
            continue;
        }
        let min = rule.min.clamp(1, 60);
        if min == 1 {
            instantaneous.push(rule);
        } else {
            let alert_time = now.saturating_sub(min as u64 * 60_000);
            averaged.push((rule, alert_time));
        }
    }

    for rule in instantaneous {
        if let Some(value) = system_scalar(&rule, stats) {
            evaluate_and_flip(hub, system, &rule, value).await?;
        }
    }

    if averaged.is_empty() {
        return Ok(());
    }

    let oldest_time = averaged.iter().map(|(_, t)| *t).min().unwrap_or(now);
    let since = oldest_time.saturating_sub(90_000);
    let rows = hub.store.list_system_stats_since(&system.id, StatsTier::OneMin, since).await?;
    let oldest_loaded = rows.first().map(|r| r.created);

    for (rule, alert_time) in averaged {
        let Some(oldest) = oldest_loaded else { continue };
        if !(oldest < alert_time) {
            continue; // insufficient history (§4.7.1 step 4)
        }

        let mut sum = 0.0_f64;
        let mut count = 0u32;
        for row in rows.iter().filter(|r| r.created >= alert_time) {
            let Ok(row_stats) = serde_json::from_value::<SystemStats>(row.stats.clone()) else {
                continue;
            };
            if let Some(value) = system_scalar(&rule, &row_stats) {
                sum += value;
                count += 1;
            }
        }

        let min = rule.min.clamp(1, 60) as f64;
        if (count as f64) < min / 1.2 {
            continue; // defer — not enough samples yet
        }

        evaluate_and_flip(hub, system, &rule, sum / count as f64).await?;
    }

    Ok(())
}

/// Scalar selection per alert name (§4.7.1 step 1). `Temperature` uses the
/// hottest sensor; `Bandwidth` sums tx+rx across every NIC in MB.
fn system_scalar(rule: &AlertRule, stats: &SystemStats) -> Option<f64> {
    match rule.name {
        AlertName::Cpu => Some(stats.cpu),
        AlertName::Memory => Some(stats.mem_pct),
        AlertName::Disk => match &rule.filesystem {
            Some(fs) => stats.filesystems.get(fs).map(|f| f.used_pct),
            None => Some(stats.disk_pct),
        },
        AlertName::Temperature => {
            stats.temperatures.values().copied().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
        }
        AlertName::Bandwidth => {
            if stats.nics.is_empty() {
                None
            } else {
                Some(stats.nics.values().map(|nic| (nic[0] + nic[1]) / 1_000_000.0).sum())
            }
        }
        AlertName::LoadAvg1 => Some(stats.load_avg1),
        AlertName::LoadAvg5 => Some(stats.load_avg5),
        AlertName::LoadAvg15 => Some(stats.load_avg15),
        AlertName::Swap => Some(stats.swap_pct),
        AlertName::Battery => stats.battery_pct,
        AlertName::Status | AlertName::Smart => None,
    }
}

fn alert_name_str(name: AlertName) -> &'static str {
    match name {
        AlertName::Status => "Status",
        AlertName::Cpu => "CPU",
        AlertName::Memory => "Memory",
        AlertName::Disk => "Disk",
        AlertName::Temperature => "Temperature",
        AlertName::Bandwidth => "Bandwidth",
        AlertName::LoadAvg1 => "LoadAvg1",
        AlertName::LoadAvg5 => "LoadAvg5",
        AlertName::LoadAvg15 => "LoadAvg15",
        AlertName::Swap => "Swap",
        AlertName::Battery => "Battery",
        AlertName::Smart => "SMART",
    }
}

/// Direction-checks `value` against `rule.threshold`, flips `triggered` if
/// the crossing state changed, and fires the history + notification side
/// effects (§4.7.1 steps 6–7).
async fn evaluate_and_flip(hub: &Hub, system: &System, rule: &AlertRule, value: f64) -> anyhow::Result<()> {
    let crossed =
        if rule.name.is_inverted() { value < rule.threshold } else { value > rule.threshold };
    if crossed == rule.triggered {
        return Ok(());
    }

    let mut updated = rule.clone();
    updated.triggered = crossed;
    updated.updated = epoch_ms();
    hub.store.update_alert_rule(updated).await?;

    let name = alert_name_str(rule.name);
    if crossed {
        history::record_trigger(hub.store.as_ref(), &rule.id, &rule.user_id, &system.id, name, value)
            .await?;
    } else {
        history::record_resolve(hub.store.as_ref(), &rule.id).await?;
    }

    let title = if crossed {
        format!("{name} alert on {}", system.name)
    } else {
        format!("{name} alert resolved on {}", system.name)
    };
    hub.notifier
        .notify(AlertMessage {
            user_id: rule.user_id.clone(),
            system_id: system.id.clone(),
            title,
            body: format!("value={value:.2} threshold={:.2}", rule.threshold),
            link: None,
            link_text: None,
        })
        .await
}

/// SMART alerts (§4.7.3): bypass the `AlertRule`/`triggered` machinery
/// entirely — there's no user opt-in, so this is called directly from the
/// `upsert_smart_device` call site with the row's previous state.
pub async fn handle_smart_alert(
    hub: &Hub,
    system: &System,
    device: &SmartDevice,
    previous: Option<SmartState>,
) -> anyhow::Result<()> {
    let escalated = matches!(previous, Some(prev) if prev != SmartState::Unknown && device.state > prev);
    if !escalated {
        return Ok(());
    }
    for user_id in &system.users {
        hub.notifier
            .notify(AlertMessage {
                user_id: user_id.clone(),
                system_id: system.id.clone(),
                title: format!("SMART alert on {}", system.name),
                body: format!("{} ({}) is now {:?}", device.device, device.model, device.state),
                link: None,
                link_text: None,
            })
            .await?;
    }
    Ok(())
}

/// Container alerts (§4.7.4): same averaging machinery as system alerts,
/// keyed by container name, plus the immediate Status/Health transitions.
/// A container missing from the snapshot is treated as stopped (§9 open
/// question resolution).
pub async fn handle_container_alerts(
    hub: &Hub,
    system: &System,
    containers: &[ContainerStats],
) -> anyhow::Result<()> {
    let rules = hub.store.list_container_alert_rules_for_system(&system.id).await?;
    let now = epoch_ms();
    let by_name: HashMap<&str, &ContainerStats> =
        containers.iter().map(|c| (c.name.as_str(), c)).collect();

    for rule in rules {
        let container = by_name.get(rule.container_id.as_str()).copied();
        match rule.name {
            ContainerAlertName::Status => {
                let crossed = container.is_none();
                flip_container_rule(hub, system, rule, crossed, if crossed { 0.0 } else { 1.0 }).await?;
            }
            ContainerAlertName::Health => {
                let healthy = container
                    .map(|c| matches!(c.health.as_deref(), None | Some("none") | Some("healthy")))
                    .unwrap_or(false);
                let crossed = !healthy;
                flip_container_rule(hub, system, rule, crossed, if crossed { 0.0 } else { 1.0 }).await?;
            }
            ContainerAlertName::Cpu | ContainerAlertName::Memory | ContainerAlertName::Network => {
                let Some(value) =
                    container_scalar_value(hub, system, &rule, container, now).await?
                else {
                    continue;
                };
                let crossed = value > rule.threshold;
                flip_container_rule(hub, system, rule, crossed, value).await?;
            }
        }
    }
    Ok(())
}

async fn container_scalar_value(
    hub: &Hub,
    system: &System,
    rule: &ContainerAlertRule,
    container: Option<&ContainerStats>,
    now: EpochMs,
) -> anyhow::Result<Option<f64>> {
    let Some(container) = container else { return Ok(None) };
    let min = rule.min.clamp(1, 60);
    if min == 1 {
        return Ok(container_scalar(rule.name, container));
    }

    let alert_time = now.saturating_sub(min as u64 * 60_000);
    let since = alert_time.saturating_sub(90_000);
    let rows = hub.store.list_container_stats_since(&system.id, StatsTier::OneMin, since).await?;
    let Some(oldest) = rows.first().map(|r| r.created) else { return Ok(None) };
    if !(oldest < alert_time) {
        return Ok(None);
    }

    let mut sum = 0.0_f64;
    let mut count = 0u32;
    for row in rows.iter().filter(|r| r.created >= alert_time) {
        let Ok(list) = serde_json::from_value::<Vec<ContainerStats>>(row.containers.clone()) else {
            continue;
        };
        if let Some(entry) = list.iter().find(|c| c.name == rule.container_id) {
            if let Some(value) = container_scalar(rule.name, entry) {
                sum += value;
                count += 1;
            }
        }
    }

    if (count as f64) < min as f64 / 1.2 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64))
}

fn container_scalar(name: ContainerAlertName, c: &ContainerStats) -> Option<f64> {
    match name {
        ContainerAlertName::Cpu => Some(c.cpu_pct),
        ContainerAlertName::Memory => Some(c.mem_pct),
        ContainerAlertName::Network => {
            Some((c.net_sent_bytes + c.net_recv_bytes) as f64 / 1_000_000.0)
        }
        ContainerAlertName::Status | ContainerAlertName::Health => None,
    }
}

async fn flip_container_rule(
    hub: &Hub,
    system: &System,
    rule: ContainerAlertRule,
    crossed: bool,
    value: f64,
) -> anyhow::Result<()> {
    if crossed == rule.triggered {
        return Ok(());
    }

    let mut updated = rule.clone();
    updated.triggered = crossed;
    updated.updated = epoch_ms();
    hub.store.update_container_alert_rule(updated).await?;

    // AlertHistoryEntry has no container column; the container id rides
    // along in the `name` field since this is a per-container rule.
    let name = format!("{:?}:{}", rule.name, rule.container_id);
    if crossed {
        history::record_trigger(hub.store.as_ref(), &rule.id, &rule.user_id, &system.id, &name, value)
            .await?;
    } else {
        history::record_resolve(hub.store.as_ref(), &rule.id).await?;
    }

    let title = if crossed {
        format!("{:?} alert on {}/{}", rule.name, system.name, rule.container_id)
    } else {
        format!("{:?} alert resolved on {}/{}", rule.name, system.name, rule.container_id)
    };
    hub.notifier
        .notify(AlertMessage {
            user_id: rule.user_id,
            system_id: system.id.clone(),
            title,
            body: format!("container={} value={value:.2}", rule.container_id),
            link: None,
            link_text: None,
        })
        .await
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
