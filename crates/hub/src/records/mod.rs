// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record manager (C7): tiered rollups and bounded-retention deletion
//! (§4.6). Grounded on the same `tokio::select! { shutdown, ticker }`
//! background-loop shape [`crate::systems`] uses for polling — rollups and
//! retention are just two more long-lived loops `Hub` owns.

pub mod rollup;

use std::sync::Arc;
use std::time::Duration;

use crate::hub::Hub;
use crate::model::{epoch_ms, ContainerStatsRow, EpochMs, StatsTier, SystemStatsRow, SystemStatus};
use crate::store::Store;

/// One row in §4.6's rollup definition table.
struct TierStep {
    shorter: StatsTier,
    longer: StatsTier,
    window_ms: u64,
    min_shorter_rows: usize,
}

const TIER_STEPS: &[TierStep] = &[
    TierStep { shorter: StatsTier::OneMin, longer: StatsTier::TenMin, window_ms: 10 * 60_000, min_shorter_rows: 9 },
    TierStep { shorter: StatsTier::TenMin, longer: StatsTier::TwentyMin, window_ms: 20 * 60_000, min_shorter_rows: 2 },
    TierStep {
        shorter: StatsTier::TwentyMin,
        longer: StatsTier::OneTwentyMin,
        window_ms: 120 * 60_000,
        min_shorter_rows: 6,
    },
    TierStep {
        shorter: StatsTier::OneTwentyMin,
        longer: StatsTier::FourEightyMin,
        window_ms: 480 * 60_000,
        min_shorter_rows: 4,
    },
];

/// Padding added to the "does a longer row already exist" skip check, so a
/// rollup fired a little early by ticker jitter doesn't get re-emitted next
/// cycle (§4.6 step 2a: "created > now − window + 1 min padding").
const EXISTING_ROW_PADDING_MS: u64 = 60_000;

/// §4.6 retention table: tier -> how long rows of that tier are kept.
const RETENTION: &[(StatsTier, u64)] = &[
    (StatsTier::OneMin, 3_600_000),
    (StatsTier::TenMin, 12 * 3_600_000),
    (StatsTier::TwentyMin, 24 * 3_600_000),
    (StatsTier::OneTwentyMin, 7 * 24 * 3_600_000),
    (StatsTier::FourEightyMin, 30 * 24 * 3_600_000),
];

/// Spawn the rollup sweep (§4.6, default every 10 minutes).
pub fn spawn_rollup_loop(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    let interval = hub.config.rollup_interval();
    let shutdown = hub.shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = run_rollup_cycle(&hub).await {
                        tracing::warn!(%err, "rollup cycle failed");
                    }
                }
            }
        }
    })
}

/// Spawn the retention sweep (§4.6, hourly at minute 8).
pub fn spawn_retention_loop(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    let interval = hub.config.retention_interval();
    let shutdown = hub.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay_to_retention_mark(epoch_ms())).await;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = run_retention_cycle(&hub).await {
                        tracing::warn!(%err, "retention cycle failed");
                    }
                }
            }
        }
    })
}

/// Milliseconds from `now` until the next wall-clock `:08` minute mark.
fn delay_to_retention_mark(now: EpochMs) -> Duration {
    const TARGET_MINUTE_MS: u64 = 8 * 60_000;
    const HOUR_MS: u64 = 3_600_000;
    let within_hour = now % HOUR_MS;
    let delay = if within_hour <= TARGET_MINUTE_MS {
        TARGET_MINUTE_MS - within_hour
    } else {
        HOUR_MS - within_hour + TARGET_MINUTE_MS
    };
    Duration::from_millis(delay.max(1))
}

/// One rollup cycle (§4.6 "Algorithm"), executed tier-by-tier per up system.
/// Each (system, tier-step, collection) rollup is independent of every
/// other — there is no cross-system state — so a real `Store` could wrap
/// this call in one transaction without changing any of this function's logic.
pub async fn run_rollup_cycle(hub: &Hub) -> anyhow::Result<()> {
    let now = epoch_ms();
    let systems = hub.store.list_systems().await?;
    for system in systems.into_iter().filter(|s| s.status == SystemStatus::Up) {
        for step in TIER_STEPS {
            if let Err(err) = roll_system_stats(hub.store.as_ref(), &system.id, step, now).await {
                tracing::warn!(system_id = %system.id, %err, "system-stats rollup failed");
            }
            if let Err(err) = roll_container_stats(hub.store.as_ref(), &system.id, step, now).await {
                tracing::warn!(system_id = %system.id, %err, "container-stats rollup failed");
            }
        }
    }
    Ok(())
}

async fn roll_system_stats(
    store: &dyn Store,
    system_id: &str,
    step: &TierStep,
    now: EpochMs,
) -> anyhow::Result<()> {
    if step.longer != StatsTier::TenMin {
        let since_longer = now.saturating_sub(step.window_ms).saturating_add(EXISTING_ROW_PADDING_MS);
        if store.has_system_stats_after(system_id, step.longer, since_longer).await? {
            return Ok(());
        }
    }

    let since = now.saturating_sub(step.window_ms);
    let rows = store.list_system_stats_since(system_id, step.shorter, since).await?;
    if rows.len() < step.min_shorter_rows {
        return Ok(());
    }

    let parsed: Vec<_> = rows.iter().filter_map(|r| serde_json::from_value(r.stats.clone()).ok()).collect();
    if parsed.is_empty() {
        return Ok(());
    }
    let combined = rollup::combine_system_stats(&parsed);

    // Inserted directly, bypassing the alert engine (§4.6 step 2d).
    store
        .insert_system_stats(SystemStatsRow {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system_id.to_owned(),
            created: now,
            tier: step.longer,
            stats: serde_json::to_value(&combined)?,
        })
        .await
}

async fn roll_container_stats(
    store: &dyn Store,
    system_id: &str,
    step: &TierStep,
    now: EpochMs,
) -> anyhow::Result<()> {
    if step.longer != StatsTier::TenMin {
        let since_longer = now.saturating_sub(step.window_ms).saturating_add(EXISTING_ROW_PADDING_MS);
        if store.has_container_stats_after(system_id, step.longer, since_longer).await? {
            return Ok(());
        }
    }

    let since = now.saturating_sub(step.window_ms);
    let rows = store.list_container_stats_since(system_id, step.shorter, since).await?;
    if rows.len() < step.min_shorter_rows {
        return Ok(());
    }

    let parsed: Vec<_> =
        rows.iter().filter_map(|r| serde_json::from_value(r.containers.clone()).ok()).collect();
    if parsed.is_empty() {
        return Ok(());
    }
    let combined = rollup::combine_container_stats(&parsed);

    store
        .insert_container_stats(ContainerStatsRow {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system_id.to_owned(),
            created: now,
            tier: step.longer,
            containers: serde_json::to_value(&combined)?,
        })
        .await
}

/// One retention cycle (§4.6 "Retention"): bounded deletion per tier, expired
/// one-time quiet-hours rows, and per-user alert-history pruning. Container-
/// registry and systemd-service rows are named in the spec's retention table
/// but this crate never caches those collections locally (§4.9's container/
/// systemd endpoints proxy straight through to the live agent session), so
/// there is nothing of that shape to sweep here.
pub async fn run_retention_cycle(hub: &Hub) -> anyhow::Result<()> {
    let now = epoch_ms();
    for (tier, keep_ms) in RETENTION {
        let cutoff = now.saturating_sub(*keep_ms);
        let dropped_stats = hub.store.delete_system_stats_older_than(*tier, cutoff).await?;
        let dropped_containers = hub.store.delete_container_stats_older_than(*tier, cutoff).await?;
        if dropped_stats > 0 || dropped_containers > 0 {
            tracing::debug!(tier = tier.as_str(), dropped_stats, dropped_containers, "retention swept stats tier");
        }
    }

    hub.store.delete_expired_one_time_quiet_hours(now).await?;

    for user in hub.store.list_users().await? {
        crate::alerts::history::prune(hub.store.as_ref(), &user.id).await?;
    }

    Ok(())
}
