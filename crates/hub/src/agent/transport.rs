// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound "SSH-style" polling transport. Per §1 this is an external
//! collaborator whose interface we only sketch — `PollTransport` is the
//! seam; no real SSH client ships in this crate, mirroring the logging-only
//! email stub in [`crate::alerts::notify`].

use async_trait::async_trait;

use crate::model::{ContainerStats, SystemStats};

/// One dial-and-fetch cycle against an outbound-polled system.
#[async_trait]
pub trait PollTransport: Send + Sync {
    async fn fetch(&self, host: &str, port: u16) -> anyhow::Result<(SystemStats, Vec<ContainerStats>)>;
}

/// Always fails: there is no SSH dialer in this crate. Exists so the
/// polling scheduler has a concrete, injectable collaborator to call
/// (§5 "SSH dial timeout = 5s" is honored by the caller wrapping `fetch`
/// in `tokio::time::timeout`, not by this stub).
pub struct UnimplementedPollTransport;

#[async_trait]
impl PollTransport for UnimplementedPollTransport {
    async fn fetch(&self, host: &str, port: u16) -> anyhow::Result<(SystemStats, Vec<ContainerStats>)> {
        anyhow::bail!("outbound SSH polling to {host}:{port} is not implemented")
    }
}
