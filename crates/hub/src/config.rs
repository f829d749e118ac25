// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Top-level CLI entry point: `beszel-hub <serve|migrate>`.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "beszel-hub", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Start the HTTP server and background scheduler. The default command.
    Serve(HubConfig),
    /// Apply schema migrations and exit.
    Migrate(HubConfig),
}

/// Hub configuration, read from flags with an env-var fallback.
///
/// Each `BESZEL_HUB_*` variable falls back to its unprefixed name, matching
/// the env layout agents and operators already expect.
#[derive(Debug, Clone, clap::Args)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "BESZEL_HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8090, env = "BESZEL_HUB_PORT")]
    pub port: u16,

    /// Directory holding the Ed25519 keypair and (if applicable) the
    /// database file. Created on first run if missing.
    #[arg(long, default_value = "./beszel_data", env = "BESZEL_HUB_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Canonical external URL of this hub, reported to agents and used in
    /// notification links.
    #[arg(long, env = "BESZEL_HUB_APP_URL")]
    pub app_url: Option<String>,

    /// Disable password-based authentication entirely.
    #[arg(long, env = "BESZEL_HUB_DISABLE_PASSWORD_AUTH")]
    pub disable_password_auth: bool,

    /// Who may create new user accounts: "admin" (default) or "open".
    #[arg(long, default_value = "admin", env = "BESZEL_HUB_USER_CREATION")]
    pub user_creation: String,

    /// MFA/OTP requirement: "true" or "superusers".
    #[arg(long, env = "BESZEL_HUB_MFA_OTP")]
    pub mfa_otp: Option<String>,

    /// Share every system with every user by default.
    #[arg(long, env = "BESZEL_HUB_SHARE_ALL_SYSTEMS")]
    pub share_all_systems: bool,

    /// Auto-login as a fixed user; for trusted-network deployments only.
    #[arg(long, env = "BESZEL_HUB_AUTO_LOGIN")]
    pub auto_login: bool,

    /// HTTP header carrying a pre-authenticated identity from a trusted proxy.
    #[arg(long, env = "BESZEL_HUB_TRUSTED_AUTH_HEADER")]
    pub trusted_auth_header: Option<String>,

    /// Content-Security-Policy override for the served UI.
    #[arg(long, env = "BESZEL_HUB_CSP")]
    pub csp: Option<String>,

    /// Container-detail collection level forwarded to agents: "basic" | "full".
    #[arg(long, env = "BESZEL_HUB_CONTAINER_DETAILS")]
    pub container_details: Option<String>,

    /// System polling tick interval, in milliseconds (§4.5 default: 15s).
    #[arg(long, default_value_t = 15_000, env = "BESZEL_HUB_POLL_TICK_MS")]
    pub poll_tick_ms: u64,

    /// Rollup sweep interval, in milliseconds (§4.6 default: 10 minutes).
    #[arg(long, default_value_t = 600_000, env = "BESZEL_HUB_ROLLUP_MS")]
    pub rollup_ms: u64,

    /// Retention sweep interval, in milliseconds (§4.6 default: hourly).
    #[arg(long, default_value_t = 3_600_000, env = "BESZEL_HUB_RETENTION_MS")]
    pub retention_ms: u64,

    /// Status-alert pending-table sweep interval, in milliseconds (§4.7.2: 15s).
    #[arg(long, default_value_t = 15_000, env = "BESZEL_HUB_STATUS_SWEEP_MS")]
    pub status_sweep_ms: u64,

    /// Status-alert reconciliation interval, in milliseconds (§4.7.2: ~9 minutes).
    #[arg(long, default_value_t = 540_000, env = "BESZEL_HUB_STATUS_RECONCILE_MS")]
    pub status_reconcile_ms: u64,

    /// Per-request timeout for agent WebSocket requests, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "BESZEL_HUB_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Universal-token lifetime, in milliseconds (§3 default: 1 hour).
    #[arg(long, default_value_t = 3_600_000, env = "BESZEL_HUB_UNIVERSAL_TOKEN_TTL_MS")]
    pub universal_token_ttl_ms: u64,

    /// Outbound SSH-style dial timeout, in milliseconds (§5 default: 5s).
    #[arg(long, default_value_t = 5_000, env = "BESZEL_HUB_SSH_DIAL_TIMEOUT_MS")]
    pub ssh_dial_timeout_ms: u64,

    /// Consecutive poll/push failures before a system transitions to `down` (§4.5).
    #[arg(long, default_value_t = 3, env = "BESZEL_HUB_DOWN_AFTER_FAILURES")]
    pub down_after_failures: u32,
}

impl HubConfig {
    pub fn poll_tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_tick_ms)
    }

    pub fn rollup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rollup_ms)
    }

    pub fn retention_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retention_ms)
    }

    pub fn status_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.status_sweep_ms)
    }

    pub fn status_reconcile_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.status_reconcile_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    pub fn universal_token_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.universal_token_ttl_ms)
    }

    pub fn ssh_dial_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ssh_dial_timeout_ms)
    }

    pub fn ed25519_key_path(&self) -> PathBuf {
        self.data_dir.join("id_ed25519")
    }

    pub fn ed25519_pub_path(&self) -> PathBuf {
        self.data_dir.join("id_ed25519.pub")
    }
}

impl Command {
    pub fn config(&self) -> &HubConfig {
        match self {
            Command::Serve(c) | Command::Migrate(c) => c,
        }
    }
}
