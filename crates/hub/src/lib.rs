// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Beszel-style monitoring hub: the agent connection manager, system
//! manager, record manager, and alert engine that together turn a fleet of
//! polling/pushing agents into stats history, rollups, and notifications.

pub mod agent;
pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod expiry_map;
pub mod hub;
pub mod keys;
pub mod model;
pub mod records;
pub mod registry;
pub mod store;
pub mod systems;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::alerts::notify::Notifier;
use crate::config::HubConfig;
use crate::hub::Hub;
use crate::keys::KeyStore;
use crate::store::Store;

/// Run the hub until shutdown: load or generate its Ed25519 identity, build
/// every subsystem, spawn the background loops (§5), and serve the HTTP/WS
/// router until either a `Ctrl-C` or `shutdown` fires the graceful drain.
pub async fn run(config: HubConfig, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let keys = KeyStore::load_or_generate(&config.data_dir)?;
    let notifier = Notifier::new(Arc::clone(&store));
    let hub = Hub::new(config, store, keys, notifier, shutdown.clone());

    hub.spawn_background_loops();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_shutdown.cancel();
    });

    let router = api::build_router(Arc::clone(&hub));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "beszel-hub listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
