use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::endpoint::Endpoint;

/// Cache key: (account id, endpoint)
pub type CacheKey = (Uuid, Endpoint);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    /// Set by an explicit refresh: never fresh again, still usable as stale
    expired: bool,
}

/// In-memory cache of upstream responses.
///
/// Cache strategy:
/// - **Fresh** reads: an entry younger than the endpoint TTL answers the
///   request without touching upstream.
/// - **Stale** reads: after an upstream failure or a local rate-limit
///   rejection, an entry younger than the grace period is served instead,
///   labelled stale by the caller.
/// - Entries older than the grace period are useless and get pruned.
pub struct ResponseCache<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Value younger than `ttl` at `now`. A zero TTL never hits.
    pub fn get_fresh_at(&self, key: CacheKey, ttl: Duration, now: Instant) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .filter(|entry| {
                !entry.expired && now.saturating_duration_since(entry.fetched_at) < ttl
            })
            .map(|entry| entry.value.clone())
    }

    pub fn get_fresh(&self, key: CacheKey, ttl: Duration) -> Option<V> {
        self.get_fresh_at(key, ttl, Instant::now())
    }

    /// Value no older than `grace` at `now`, regardless of TTL.
    pub fn get_stale_at(&self, key: CacheKey, grace: Duration, now: Instant) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) <= grace)
            .map(|entry| entry.value.clone())
    }

    pub fn get_stale(&self, key: CacheKey, grace: Duration) -> Option<V> {
        self.get_stale_at(key, grace, Instant::now())
    }

    /// Age of the cached entry at `now`, if any.
    pub fn age_at(&self, key: CacheKey, now: Instant) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .map(|entry| now.saturating_duration_since(entry.fetched_at))
    }

    /// Insert or replace an entry fetched at `fetched_at`.
    pub fn insert_at(&self, key: CacheKey, value: V, fetched_at: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at,
                expired: false,
            },
        );
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Drop every entry of an account. Returns how many were removed.
    pub fn invalidate(&self, account: Uuid) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(id, _), _| *id != account);
        before - entries.len()
    }

    /// Stop serving an account's entries as fresh, keeping them for stale
    /// fallback. Returns how many were marked.
    pub fn mark_expired(&self, account: Uuid) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut marked = 0;
        for ((id, _), entry) in entries.iter_mut() {
            if *id == account && !entry.expired {
                entry.expired = true;
                marked += 1;
            }
        }
        marked
    }

    /// Drop one endpoint of one account.
    pub fn invalidate_endpoint(&self, key: CacheKey) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key).is_some()
    }

    /// Remove entries older than `grace` at `now`. Returns how many were removed.
    pub fn prune_at(&self, grace: Duration, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.fetched_at) <= grace);
        before - entries.len()
    }

    pub fn prune(&self, grace: Duration) -> usize {
        self.prune_at(grace, Instant::now())
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
