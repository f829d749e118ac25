// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent map with per-entry TTL and reverse lookup/remove-by-value.
//!
//! Backs the in-memory universal-token table (C3) and the delayed
//! status-alert pending table (C8). Expired entries are dropped lazily on
//! access; `spawn_sweeper` additionally walks the map on a ticker so an
//! entry that is never looked up again still gets reclaimed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A concurrent `String -> V` map where every entry carries an absolute
/// expiry. `GetOk` never returns an expired entry, even if the background
/// sweep has not yet run.
pub struct ExpiryMap<V> {
    inner: RwLock<HashMap<String, Entry<V>>>,
}

impl<V> Default for ExpiryMap<V> {
    fn default() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }
}

impl<V> ExpiryMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, expiring after `ttl`.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.inner.write().await.insert(key.into(), Entry { value, expires_at });
    }

    /// Remove `key` unconditionally, returning its value if present and unexpired.
    pub async fn remove(&self, key: &str) -> Option<V> {
        let mut map = self.inner.write().await;
        match map.remove(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Some(entry.value),
            _ => None,
        }
    }

    /// Count of non-expired entries. Does not mutate the map.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.read().await.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every expired entry. Safe to call concurrently with readers.
    pub async fn sweep(&self) {
        let now = Instant::now();
        self.inner.write().await.retain(|_, entry| !entry.is_expired(now));
    }

    /// Remove and return every currently-expired `(key, value)` pair, for
    /// callers that need to act on an expiry rather than silently drop it
    /// (e.g. the delayed status-alert worker firing a "down" notification).
    pub async fn take_expired(&self) -> Vec<(String, V)> {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let expired_keys: Vec<String> =
            map.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect();
        expired_keys
            .into_iter()
            .filter_map(|k| map.remove(&k).map(|entry| (k, entry.value)))
            .collect()
    }

    /// Spawn a background sweeper on `interval`, stopping when `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()>
    where
        V: Send + Sync + 'static,
    {
        let map = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        map.sweep().await;
                    }
                }
            }
        })
    }
}

impl<V: Clone> ExpiryMap<V> {
    /// Look up `key`. Never returns an expired entry.
    pub async fn get_ok(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let map = self.inner.read().await;
        match map.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }
}

impl<V: Clone + PartialEq> ExpiryMap<V> {
    /// Reverse lookup: find the (key, value) pair whose value equals `needle`.
    pub async fn get_by_value(&self, needle: &V) -> Option<(String, V)> {
        let now = Instant::now();
        let map = self.inner.read().await;
        map.iter()
            .find(|(_, entry)| !entry.is_expired(now) && &entry.value == needle)
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
    }

    /// Reverse-lookup and remove. Returns the removed (key, value) pair.
    pub async fn remove_by_value(&self, needle: &V) -> Option<(String, V)> {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let key = map
            .iter()
            .find(|(_, entry)| !entry.is_expired(now) && &entry.value == needle)
            .map(|(k, _)| k.clone())?;
        map.remove(&key).map(|entry| (key, entry.value))
    }
}

#[cfg(test)]
#[path = "expiry_map_tests.rs"]
mod tests;
