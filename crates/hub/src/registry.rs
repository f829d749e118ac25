// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fingerprint / universal-token registry (C3).
//!
//! Wraps the persistent `fingerprints`/`universal_tokens` collections with
//! an in-memory [`ExpiryMap`] cache for universal tokens, mirroring the
//! teacher's `MuxState.sessions` concurrent-map shape but keyed by token
//! instead of session id.

use std::sync::Arc;
use std::time::Duration;

use crate::expiry_map::ExpiryMap;
use crate::model::{epoch_ms, FingerprintBinding, UniversalToken};
use crate::store::Store;

pub struct FingerprintRegistry {
    store: Arc<dyn Store>,
    /// token -> user id, hot path for newly issued universal tokens (§4.3 step 2a).
    universal_cache: Arc<ExpiryMap<String>>,
    ttl: Duration,
}

impl FingerprintRegistry {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, universal_cache: Arc::new(ExpiryMap::new()), ttl }
    }

    pub fn universal_cache(&self) -> &Arc<ExpiryMap<String>> {
        &self.universal_cache
    }

    /// Issue (or refresh) a universal token for `user_id`, both in the hot
    /// cache and the persistent fallback collection.
    pub async fn create_universal_token(&self, token: &str, user_id: &str) -> anyhow::Result<()> {
        self.universal_cache.set(token, user_id.to_owned(), self.ttl).await;
        self.store
            .put_universal_token(UniversalToken {
                token: token.to_owned(),
                user_id: user_id.to_owned(),
                enabled: true,
                created: epoch_ms(),
            })
            .await
    }

    /// Revoke `token`, but only if it currently belongs to `user_id` — a
    /// universal token is keyed by its owner, not a bearer secret alone.
    /// A token that was never created is reported as not-found rather than
    /// silently fabricated as a disabled record.
    pub async fn revoke_universal_token(&self, token: &str, user_id: &str) -> anyhow::Result<bool> {
        let Some(existing) = self.store.get_universal_token(token).await? else {
            return Ok(false);
        };
        if existing.user_id != user_id {
            return Ok(false);
        }
        self.universal_cache.remove(token).await;
        self.store
            .put_universal_token(UniversalToken {
                token: token.to_owned(),
                user_id: user_id.to_owned(),
                enabled: false,
                created: existing.created,
            })
            .await?;
        Ok(true)
    }

    /// Resolve `token` to a universal-token owner, checking the in-memory
    /// cache first, then the persistent collection (§4.3 step 2a/2b).
    pub async fn resolve_universal_user(&self, token: &str) -> anyhow::Result<Option<String>> {
        if let Some(user_id) = self.universal_cache.get_ok(token).await {
            return Ok(Some(user_id));
        }
        match self.store.get_universal_token(token).await? {
            Some(ut) if ut.enabled => Ok(Some(ut.user_id)),
            _ => Ok(None),
        }
    }

    /// All fingerprint bindings recorded against `token` (§4.3 step 2c).
    pub async fn bindings_for_token(&self, token: &str) -> anyhow::Result<Vec<FingerprintBinding>> {
        self.store.list_bindings_for_token(token).await
    }
}
