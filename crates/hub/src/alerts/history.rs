// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alerts-history lifecycle (C10). Driven by explicit calls from the
//! alert engine's trigger-flip path rather than store-side hooks — the
//! `Store` trait (C16) sketches a hook extension point, but this crate
//! does not implement a generic callback-on-mutation system (§4.8).

use uuid::Uuid;

use crate::model::{epoch_ms, AlertHistoryEntry};
use crate::store::Store;

/// Create a history row for a rule that just flipped false→true.
pub async fn record_trigger(
    store: &dyn Store,
    alert_id: &str,
    user_id: &str,
    system_id: &str,
    name: &str,
    value: f64,
) -> anyhow::Result<()> {
    store
        .create_alert_history(AlertHistoryEntry {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.to_owned(),
            user_id: user_id.to_owned(),
            system_id: system_id.to_owned(),
            name: name.to_owned(),
            value,
            created: epoch_ms(),
            resolved: None,
        })
        .await
}

/// Resolve the latest unresolved history row for a rule that just
/// flipped true→false, or was deleted while triggered.
pub async fn record_resolve(store: &dyn Store, alert_id: &str) -> anyhow::Result<()> {
    store.resolve_latest_unresolved_history(alert_id, epoch_ms()).await
}

/// Prune a user's alert history to `keep` rows once it exceeds `threshold`
/// (§4.6 retention: newest 200 kept once a user exceeds 250).
pub async fn prune(store: &dyn Store, user_id: &str) -> anyhow::Result<u64> {
    const KEEP: usize = 200;
    const THRESHOLD: usize = 250;
    store.prune_alert_history(user_id, KEEP, THRESHOLD).await
}
