// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated-user extractor for the `(auth)` endpoints in §4.9.
//!
//! Per §1, "Authentication UI, OAuth, SMTP/webhook transport, YAML config
//! import" are out of scope — specified only as interfaces. This extractor
//! is that interface's Rust-facing stand-in: it trusts an upstream proxy
//! (or, in tests, the caller directly) to have already authenticated the
//! request and to forward the resulting user id in a header, the same
//! trusted-header model `BESZEL_HUB_TRUSTED_AUTH_HEADER` already describes
//! (§6). No session cookies, passwords, or OAuth flows are implemented here.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::HubError;
use crate::hub::Hub;

/// Default header name when `trusted_auth_header` isn't configured —
/// convenient for local/dev use and for the integration test harness (C17).
const DEFAULT_USER_HEADER: &str = "x-beszel-user";

pub struct AuthUser(pub String);

impl FromRequestParts<Arc<Hub>> for AuthUser {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, hub: &Arc<Hub>) -> Result<Self, Self::Rejection> {
        let header_name = hub.config.trusted_auth_header.as_deref().unwrap_or(DEFAULT_USER_HEADER);
        let user_id = parts
            .headers
            .get(header_name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(HubError::Unauthorized)?;
        Ok(AuthUser(user_id.to_owned()))
    }
}
