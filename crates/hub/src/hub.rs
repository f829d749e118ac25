// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application context (C15). `Hub` owns every long-lived subsystem as a
//! plain field and hands out explicit references rather than the teacher's
//! (and the reference implementation's) cyclic back-pointers — see §9
//! "Cyclic references" / "Global mutable state".

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::alerts::notify::Notifier;
use crate::alerts::status::StatusAlertWorker;
use crate::config::HubConfig;
use crate::keys::KeyStore;
use crate::registry::FingerprintRegistry;
use crate::store::Store;
use crate::systems::SystemManager;

/// The single place C1-C12 meet. Cheap to clone (everything behind `Arc`),
/// so handlers and background tasks hold an `Arc<Hub>` rather than reaching
/// back through a session or manager.
pub struct Hub {
    pub config: HubConfig,
    pub store: Arc<dyn Store>,
    pub keys: KeyStore,
    pub fingerprints: FingerprintRegistry,
    pub systems: SystemManager,
    pub status_alerts: Arc<StatusAlertWorker>,
    pub notifier: Notifier,
    pub shutdown: CancellationToken,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        store: Arc<dyn Store>,
        keys: KeyStore,
        notifier: Notifier,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let universal_ttl = config.universal_token_ttl();
        Arc::new(Self {
            fingerprints: FingerprintRegistry::new(Arc::clone(&store), universal_ttl),
            systems: SystemManager::new(),
            status_alerts: Arc::new(StatusAlertWorker::new()),
            notifier,
            config,
            store,
            keys,
            shutdown,
        })
    }

    /// Spawn every background loop this hub owns: system polling, rollups,
    /// retention, the status-alert ticker, and its reconciliation sweep.
    /// Each follows the same `select! { shutdown, tick }` shape (§5).
    pub fn spawn_background_loops(self: &Arc<Self>) {
        crate::systems::spawn_poll_scheduler(Arc::clone(self));
        crate::records::spawn_rollup_loop(Arc::clone(self));
        crate::records::spawn_retention_loop(Arc::clone(self));
        crate::alerts::status::StatusAlertWorker::spawn_sweep(
            Arc::clone(&self.status_alerts),
            Arc::clone(self),
        );
        crate::alerts::status::StatusAlertWorker::spawn_reconciliation(Arc::clone(self));
        self.fingerprints
            .universal_cache()
            .spawn_sweeper(Duration::from_secs(60), self.shutdown.clone());
    }
}
