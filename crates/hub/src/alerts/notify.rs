// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification dispatch (C11). Email and webhook are both external
//! collaborators per §1 — this crate ships a real `ReqwestWebhookTransport`
//! (a webhook is just an authenticated HTTP POST) and a logging stub for
//! email, since SMTP transport internals are out of scope.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::alerts::quiet_hours;
use crate::model::epoch_ms;
use crate::store::Store;

/// Expanded from an alert rule/status transition into recipient-agnostic
/// content; `Notifier` fans it out to every email/webhook the user configured.
#[derive(Debug, Clone, Serialize)]
pub struct AlertMessage {
    pub user_id: String,
    pub system_id: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub link_text: Option<String>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, message: &AlertMessage);
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, url: &str, message: &AlertMessage);
}

/// Logs rather than sends; SMTP transport internals are out of scope (§1, §6).
pub struct LoggingEmailTransport;

#[async_trait]
impl EmailTransport for LoggingEmailTransport {
    async fn send(&self, to: &str, message: &AlertMessage) {
        tracing::info!(%to, title = %message.title, "alert email (logging stub, not sent)");
    }
}

/// A real webhook sender: POSTs the message as JSON using the crate's
/// existing `reqwest` client.
pub struct ReqwestWebhookTransport {
    client: reqwest::Client,
}

impl ReqwestWebhookTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestWebhookTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn send(&self, url: &str, message: &AlertMessage) {
        if let Err(err) = self.client.post(url).json(message).send().await {
            tracing::warn!(%url, %err, "webhook delivery failed, not retrying");
        }
    }
}

/// Fans an [`AlertMessage`] out to every email/webhook a user has
/// configured, after checking quiet hours (§4.7.5). Best-effort: a
/// transport failure is logged and never retried (§4.7.6).
pub struct Notifier {
    store: Arc<dyn Store>,
    email: Box<dyn EmailTransport>,
    webhook: Box<dyn WebhookTransport>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            email: Box::new(LoggingEmailTransport),
            webhook: Box::new(ReqwestWebhookTransport::default()),
        }
    }

    pub fn with_transports(
        store: Arc<dyn Store>,
        email: Box<dyn EmailTransport>,
        webhook: Box<dyn WebhookTransport>,
    ) -> Self {
        Self { store, email, webhook }
    }

    pub async fn notify(&self, message: AlertMessage) -> anyhow::Result<()> {
        let windows = self.store.list_quiet_hours_for_user(&message.user_id).await?;
        if quiet_hours::is_silenced(&windows, &message.system_id, epoch_ms()) {
            tracing::debug!(user_id = %message.user_id, "notification silenced by quiet hours");
            return Ok(());
        }

        let settings = self.store.get_notification_settings(&message.user_id).await?;
        for email in &settings.emails {
            self.email.send(email, &message).await;
        }
        for webhook in &settings.webhooks {
            self.webhook.send(webhook, &message).await;
        }
        Ok(())
    }
}
