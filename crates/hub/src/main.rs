// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::error;

use beszel_hub::config::{Cli, Command};
use beszel_hub::store::memory::MemoryStore;
use beszel_hub::store::Store;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Command::Serve(config) => {
            // The persistent store is an external collaborator this crate
            // only sketches a trait for (§3, C16); nothing production-grade
            // ships here, so `serve` runs against an in-memory stand-in.
            tracing::warn!(
                "no persistent store configured: records, alert rules, and history are in-memory and do not survive a restart"
            );
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            if let Err(e) = beszel_hub::run(config, store).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
        Command::Migrate(config) => {
            tracing::info!(
                data_dir = %config.data_dir.display(),
                "no schema migrations to apply: the persistent store is an external collaborator this crate does not implement"
            );
        }
    }
}
