// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket surface (C12, §4.9). **[GROUNDED]** on the teacher's
//! `transport::build_router` shape: one function wiring every route, CORS
//! and tracing as outer layers, `with_state` last. Unlike the teacher, auth
//! is not a single blanket middleware — `first-run`, `create-user`, and
//! `agent-connect` are deliberately open, so each protected handler pulls
//! [`auth::AuthUser`] itself instead.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::hub::Hub;

/// Build the full axum `Router` for a hub instance.
pub fn build_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/api/beszel/first-run", get(handlers::first_run))
        .route("/api/beszel/create-user", post(handlers::create_user))
        .route("/api/beszel/getkey", get(handlers::get_key))
        .route("/api/beszel/agent-connect", get(crate::agent::connect::agent_connect))
        .route("/api/beszel/universal-token", get(handlers::universal_token))
        .route(
            "/api/beszel/user-alerts",
            post(handlers::upsert_user_alerts).delete(handlers::delete_user_alerts),
        )
        .route("/api/beszel/containers/logs", get(handlers::container_logs))
        .route("/api/beszel/containers/info", get(handlers::container_info))
        .route("/api/beszel/systemd/info", get(handlers::systemd_info))
        .route("/api/beszel/smart/refresh", post(handlers::smart_refresh))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub)
}
