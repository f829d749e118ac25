// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test-only helper for building a fully wired [`Hub`] against a
//! [`MemoryStore`], used by alert-engine and status-alert unit tests that
//! need to exercise a real trigger/resolve/notify round trip rather than
//! just the pure scalar-selection helpers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use clap::Parser;

use crate::alerts::notify::Notifier;
use crate::config::{Cli, Command};
use crate::hub::Hub;
use crate::keys::KeyStore;
use crate::store::memory::MemoryStore;
use crate::store::Store;

pub fn test_hub() -> Arc<Hub> {
    let data_dir = tempfile::tempdir().expect("tempdir").into_path();
    let cli = Cli::parse_from(["beszel-hub", "serve", "--data-dir", data_dir.to_str().expect("utf8 path")]);
    let config = match cli.command {
        Command::Serve(c) | Command::Migrate(c) => c,
    };
    let keys = KeyStore::load_or_generate(&config.data_dir).expect("keypair");
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let notifier = Notifier::new(Arc::clone(&store));
    Hub::new(config, store, keys, notifier, CancellationToken::new())
}
